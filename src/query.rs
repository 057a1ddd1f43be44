//! Tiered Entrez query construction, strictest first.

use std::fmt;

use crate::domain::{AssemblyLevel, RetrievalRequest};
use crate::presets::{OrganismPreset, canonical_organism};

pub const TIER_COUNT: usize = 4;

pub const EXCLUDED_KEYWORDS: [&str; 4] = ["resistance", "resistant", "multidrug", "hypothetical"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Organism(String),
    Strain(String),
    ProteinName(String),
    BioSample(String),
    CompleteGenome,
    AssemblyLevel(AssemblyLevel),
    RefSeqOnly,
    ExcludeKeywords,
}

impl Clause {
    fn is_genome_filter(&self) -> bool {
        matches!(self, Clause::CompleteGenome | Clause::AssemblyLevel(_))
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Organism(name) => write!(f, "\"{name}\"[Organism]"),
            Clause::Strain(strain) => write!(f, "\"{strain}\"[Strain]"),
            Clause::ProteinName(name) => write!(f, "\"{name}\"[Protein Name]"),
            Clause::BioSample(query) => write!(f, "({query})"),
            Clause::CompleteGenome => write!(f, "(\"complete genome\"[Filter])"),
            Clause::AssemblyLevel(level) => {
                write!(f, "(\"{}\"[Assembly Level])", level.ncbi_label())
            }
            Clause::RefSeqOnly => write!(f, "(srcdb_refseq[PROP])"),
            Clause::ExcludeKeywords => write!(f, "({})", EXCLUDED_KEYWORDS.join(" OR ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub tier: usize,
    pub clauses: Vec<Clause>,
    pub term: String,
}

impl SearchQuery {
    fn new(tier: usize, clauses: Vec<Clause>) -> Self {
        let term = render(&clauses);
        Self {
            tier,
            clauses,
            term,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBuilder {
    pub protein_name: String,
    pub organism_name: String,
    pub strain: Option<String>,
    pub assembly_level: Option<AssemblyLevel>,
    pub biosample_query: Option<String>,
}

impl QueryBuilder {
    /// Resolves the organism against the presets; the strain override is
    /// only taken from a matching preset that pins this exact protein.
    pub fn for_request(request: &RetrievalRequest) -> Self {
        let preset = OrganismPreset::lookup(&request.organism);
        let organism_name = canonical_organism(&request.organism);
        let strain = preset
            .and_then(|preset| preset.strain_for(&request.protein_name))
            .map(str::to_string);
        let biosample_query = request
            .biosample_query
            .as_deref()
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(str::to_string);

        Self {
            protein_name: request.protein_name.clone(),
            organism_name,
            strain,
            assembly_level: request.assembly_level,
            biosample_query,
        }
    }

    pub fn build(&self) -> Vec<SearchQuery> {
        let mut base = vec![Clause::Organism(self.organism_name.clone())];
        if let Some(strain) = &self.strain {
            base.push(Clause::Strain(strain.clone()));
        }
        base.push(Clause::ProteinName(self.protein_name.clone()));
        if let Some(query) = &self.biosample_query {
            base.push(Clause::BioSample(query.clone()));
        }

        let genome_filter = match self.assembly_level {
            Some(level) => Clause::AssemblyLevel(level),
            None => Clause::CompleteGenome,
        };

        let mut strict = base.clone();
        strict.extend([genome_filter, Clause::RefSeqOnly, Clause::ExcludeKeywords]);

        let relaxed = without(&strict, |clause| *clause == Clause::ExcludeKeywords);
        let broad = without(&relaxed, |clause| *clause == Clause::RefSeqOnly);
        let broadest = without(&broad, Clause::is_genome_filter);

        [strict, relaxed, broad, broadest]
            .into_iter()
            .enumerate()
            .map(|(tier, clauses)| SearchQuery::new(tier, clauses))
            .collect()
    }
}

pub fn build_queries(request: &RetrievalRequest) -> Vec<SearchQuery> {
    QueryBuilder::for_request(request).build()
}

fn without(clauses: &[Clause], dropped: impl Fn(&Clause) -> bool) -> Vec<Clause> {
    clauses
        .iter()
        .filter(|clause| !dropped(*clause))
        .cloned()
        .collect()
}

// Entrez NOT is a binary operator, so the exclusion joins without AND.
fn render(clauses: &[Clause]) -> String {
    let mut term = String::new();
    for clause in clauses {
        if !term.is_empty() {
            match clause {
                Clause::ExcludeKeywords => term.push_str(" NOT "),
                _ => term.push_str(" AND "),
            }
        }
        term.push_str(&clause.to_string());
    }
    term
}
