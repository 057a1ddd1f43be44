use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::RefProtError;

pub const NCBI_PROTEIN_URL: &str = "https://www.ncbi.nlm.nih.gov/protein";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum AssemblyLevel {
    CompleteGenome,
    Chromosome,
    Scaffold,
    Contig,
}

impl AssemblyLevel {
    /// Value as it appears in the NCBI `[Assembly Level]` field.
    pub fn ncbi_label(self) -> &'static str {
        match self {
            AssemblyLevel::CompleteGenome => "Complete Genome",
            AssemblyLevel::Chromosome => "Chromosome",
            AssemblyLevel::Scaffold => "Scaffold",
            AssemblyLevel::Contig => "Contig",
        }
    }
}

impl fmt::Display for AssemblyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyLevel::CompleteGenome => write!(f, "complete_genome"),
            AssemblyLevel::Chromosome => write!(f, "chromosome"),
            AssemblyLevel::Scaffold => write!(f, "scaffold"),
            AssemblyLevel::Contig => write!(f, "contig"),
        }
    }
}

impl FromStr for AssemblyLevel {
    type Err = RefProtError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "complete_genome" => Ok(AssemblyLevel::CompleteGenome),
            "chromosome" => Ok(AssemblyLevel::Chromosome),
            "scaffold" => Ok(AssemblyLevel::Scaffold),
            "contig" => Ok(AssemblyLevel::Contig),
            _ => Err(RefProtError::InvalidAssemblyLevel(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    pub protein_name: String,
    pub organism: String,
    pub assembly_level: Option<AssemblyLevel>,
    pub biosample_query: Option<String>,
    pub contact_email: String,
}

/// Metadata stored alongside a cached sequence. Field names follow the
/// cache file format, so every field tolerates absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SequenceMetadata {
    #[serde(default)]
    pub protein_length: Option<usize>,
    #[serde(default)]
    pub source_strain: Option<String>,
    #[serde(default)]
    pub ncbi_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub organism: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievalResult {
    pub protein_name: String,
    pub accession: String,
    #[serde(skip_serializing)]
    pub raw_sequence_record: String,
    pub sequence_length: usize,
    pub source_strain: String,
    pub ncbi_url: String,
    pub title: String,
    pub organism_label: String,
    pub metadata_complete: bool,
}

impl RetrievalResult {
    pub fn metadata(&self) -> SequenceMetadata {
        SequenceMetadata {
            protein_length: Some(self.sequence_length),
            source_strain: Some(self.source_strain.clone()),
            ncbi_url: Some(self.ncbi_url.clone()),
            title: Some(self.title.clone()),
            organism: Some(self.organism_label.clone()),
        }
    }
}

pub fn protein_url(uid: &str) -> String {
    format!("{NCBI_PROTEIN_URL}/{uid}")
}
