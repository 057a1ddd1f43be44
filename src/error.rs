use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum RefProtError {
    #[error("organism is required (use --organism or `organism:` in the config file)")]
    MissingOrganism,

    #[error("contact email is required by NCBI (use --email or `email:` in the config file)")]
    MissingEmail,

    #[error("no protein names provided for custom organism {0} (use --proteins or --protein-list)")]
    MissingProteins(String),

    #[error("protein selection `all` requires a preset organism, got {0}")]
    AllRequiresPreset(String),

    #[error("protein list is empty")]
    EmptyProteinList,

    #[error("invalid assembly level: {0} (expected complete_genome|chromosome|scaffold|contig)")]
    InvalidAssemblyLevel(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse YAML config: {0}")]
    ConfigParse(String),

    #[error("failed to read protein list at {0}")]
    ProteinListRead(PathBuf),

    #[error("NCBI request failed: {0}")]
    EntrezHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    EntrezStatus { status: u16, message: String },

    #[error("unexpected NCBI response: {0}")]
    EntrezParse(String),

    #[error("invalid FASTA record: {0}")]
    FastaParse(String),

    #[error("query cache error: {0}")]
    Cache(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl RefProtError {
    /// Errors that abort a run before any remote call is made.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RefProtError::MissingOrganism
                | RefProtError::MissingEmail
                | RefProtError::MissingProteins(_)
                | RefProtError::AllRequiresPreset(_)
                | RefProtError::EmptyProteinList
                | RefProtError::InvalidAssemblyLevel(_)
                | RefProtError::ConfigRead(_)
                | RefProtError::ConfigParse(_)
                | RefProtError::ProteinListRead(_)
        )
    }
}
