use serde::Serialize;

use crate::domain::RetrievalResult;
use crate::engine::{NotFound, ResultSource, RetrievalOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProteinStatus {
    Retrieved {
        accession: String,
        source: ResultSource,
    },
    NotFound {
        reason: NotFound,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProteinEntry {
    pub protein_name: String,
    #[serde(flatten)]
    pub status: ProteinStatus,
}

/// Outcomes of one run, in request order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub organism: String,
    pub entries: Vec<ProteinEntry>,
    pub results: Vec<RetrievalResult>,
}

impl RunReport {
    pub fn new(organism: impl Into<String>) -> Self {
        Self {
            organism: organism.into(),
            entries: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn record(&mut self, protein_name: &str, outcome: RetrievalOutcome) {
        let status = match outcome {
            RetrievalOutcome::Found { result, source } => {
                let status = ProteinStatus::Retrieved {
                    accession: result.accession.clone(),
                    source,
                };
                self.results.push(result);
                status
            }
            RetrievalOutcome::NotFound(reason) => ProteinStatus::NotFound { reason },
        };
        self.entries.push(ProteinEntry {
            protein_name: protein_name.to_string(),
            status,
        });
    }

    pub fn results(&self) -> &[RetrievalResult] {
        &self.results
    }

    pub fn not_found(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.status, ProteinStatus::NotFound { .. }))
            .map(|entry| entry.protein_name.as_str())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn retrieved_count(&self) -> usize {
        self.results.len()
    }

    pub fn not_found_count(&self) -> usize {
        self.total() - self.retrieved_count()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
