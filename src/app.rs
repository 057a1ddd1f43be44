use camino::Utf8Path;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::config::RunPlan;
use crate::engine::{RetrievalOutcome, Retriever};
use crate::ncbi::EntrezClient;
use crate::output::{RunArtifacts, write_outputs};
use crate::report::RunReport;

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub report: RunReport,
    pub artifacts: RunArtifacts,
}

pub struct App<E: EntrezClient, S: CacheStore> {
    retriever: Retriever<E, S>,
}

impl<E: EntrezClient, S: CacheStore> App<E, S> {
    pub fn new(retriever: Retriever<E, S>) -> Self {
        Self { retriever }
    }

    /// Retrieves every protein of the plan in order, then writes the
    /// artifacts into `output_dir`. Per-protein failures only shrink the
    /// result set.
    pub fn run(&self, plan: &RunPlan, output_dir: &Utf8Path) -> RunSummary {
        info!(organism = %plan.organism, "starting retrieval");
        info!("target proteins: {}", plan.proteins.join(", "));
        info!(output = %plan.output.base_name, "output base name");
        if let Some(level) = plan.assembly_level {
            info!(assembly_level = %level, "assembly level filter");
        }
        if let Some(query) = &plan.biosample_query {
            info!(biosample_query = %query, "BioSample query");
        }

        let report = self.collect(plan);

        if report.is_empty() {
            warn!("no proteins were retrieved, no output files will be generated");
            return RunSummary {
                report,
                artifacts: RunArtifacts::default(),
            };
        }

        let artifacts = write_outputs(&report, plan, output_dir);
        info!(
            retrieved = report.retrieved_count(),
            not_found = report.not_found_count(),
            "run completed"
        );
        RunSummary { report, artifacts }
    }

    pub fn collect(&self, plan: &RunPlan) -> RunReport {
        let mut report = RunReport::new(plan.organism.clone());
        for request in plan.requests() {
            let outcome = self.retriever.retrieve(&request);
            if let RetrievalOutcome::NotFound(reason) = &outcome {
                warn!(protein = %request.protein_name, %reason, "skipping protein");
            }
            report.record(&request.protein_name, outcome);
        }
        report
    }
}
