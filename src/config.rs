use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::{AssemblyLevel, RetrievalRequest};
use crate::error::RefProtError;
use crate::presets::OrganismPreset;

pub const DEFAULT_OUTPUT: &str = "refprot_output";
pub const ALL_PROTEINS: &str = "all";

/// YAML run file. Keys mirror the command-line flags; values here win
/// over flags. Unknown keys are ignored.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub organism: Option<String>,
    #[serde(default)]
    pub proteins: Option<ProteinSelection>,
    #[serde(default)]
    pub protein_list: Option<PathBuf>,
    #[serde(default)]
    pub assembly_level: Option<String>,
    #[serde(default)]
    pub biosample_query: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub multi_fasta: Option<bool>,
    #[serde(default)]
    pub html_report: Option<bool>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub settings: Option<Box<FileConfig>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ProteinSelection {
    List(Vec<String>),
    Text(String),
}

impl ProteinSelection {
    fn into_text(self) -> String {
        match self {
            ProteinSelection::List(names) => names.join(","),
            ProteinSelection::Text(text) => text,
        }
    }
}

impl FileConfig {
    /// Folds the nested `settings` block and the `user_email` alias into
    /// the top level; nested values win.
    pub fn flatten(mut self) -> FileConfig {
        if let Some(settings) = self.settings.take() {
            let settings = settings.flatten();
            self.organism = settings.organism.or(self.organism);
            self.proteins = settings.proteins.or(self.proteins);
            self.protein_list = settings.protein_list.or(self.protein_list);
            self.assembly_level = settings.assembly_level.or(self.assembly_level);
            self.biosample_query = settings.biosample_query.or(self.biosample_query);
            self.output = settings.output.or(self.output);
            self.multi_fasta = settings.multi_fasta.or(self.multi_fasta);
            self.html_report = settings.html_report.or(self.html_report);
            self.email = settings.email.or(self.email);
        }
        if let Some(user_email) = self.user_email.take() {
            self.email = Some(user_email);
        }
        self
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(path: &Path) -> Result<FileConfig, RefProtError> {
        let content =
            fs::read_to_string(path).map_err(|_| RefProtError::ConfigRead(path.to_path_buf()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<FileConfig, RefProtError> {
        if content.trim().is_empty() {
            return Ok(FileConfig::default());
        }
        let config: FileConfig = serde_yaml::from_str(content)
            .map_err(|err| RefProtError::ConfigParse(err.to_string()))?;
        Ok(config.flatten())
    }
}

/// Run parameters as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub organism: Option<String>,
    pub proteins: Option<String>,
    pub protein_list: Option<PathBuf>,
    pub assembly_level: Option<AssemblyLevel>,
    pub biosample_query: Option<String>,
    pub output: Option<String>,
    pub multi_fasta: bool,
    pub html_report: bool,
    pub email: Option<String>,
}

impl RunInputs {
    pub fn merge(mut self, file: FileConfig) -> Result<Self, RefProtError> {
        let file = file.flatten();
        if let Some(organism) = file.organism {
            self.organism = Some(organism);
        }
        if let Some(proteins) = file.proteins {
            self.proteins = Some(proteins.into_text());
        }
        if let Some(protein_list) = file.protein_list {
            self.protein_list = Some(protein_list);
        }
        if let Some(level) = file.assembly_level {
            self.assembly_level = Some(level.parse()?);
        }
        if let Some(query) = file.biosample_query {
            self.biosample_query = Some(query);
        }
        if let Some(output) = file.output {
            self.output = Some(output);
        }
        if let Some(multi_fasta) = file.multi_fasta {
            self.multi_fasta = multi_fasta;
        }
        if let Some(html_report) = file.html_report {
            self.html_report = html_report;
        }
        if let Some(email) = file.email {
            self.email = Some(email);
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputOptions {
    pub base_name: String,
    pub multi_fasta: bool,
    pub html_report: bool,
}

impl OutputOptions {
    /// Run log written next to the other artifacts.
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.base_name)
    }
}

/// Validated run: every field needed before the first remote call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub organism: String,
    pub proteins: Vec<String>,
    pub assembly_level: Option<AssemblyLevel>,
    pub biosample_query: Option<String>,
    pub email: String,
    pub output: OutputOptions,
}

impl RunPlan {
    pub fn resolve(inputs: RunInputs) -> Result<Self, RefProtError> {
        let organism = non_blank(inputs.organism).ok_or(RefProtError::MissingOrganism)?;
        let email = non_blank(inputs.email).ok_or(RefProtError::MissingEmail)?;
        let proteins = resolve_proteins(
            &organism,
            inputs.proteins.as_deref(),
            inputs.protein_list.as_deref(),
        )?;

        Ok(Self {
            organism,
            proteins,
            assembly_level: inputs.assembly_level,
            biosample_query: non_blank(inputs.biosample_query),
            email,
            output: OutputOptions {
                base_name: non_blank(inputs.output).unwrap_or_else(|| DEFAULT_OUTPUT.to_string()),
                multi_fasta: inputs.multi_fasta,
                html_report: inputs.html_report,
            },
        })
    }

    pub fn requests(&self) -> Vec<RetrievalRequest> {
        self.proteins
            .iter()
            .map(|protein| RetrievalRequest {
                protein_name: protein.clone(),
                organism: self.organism.clone(),
                assembly_level: self.assembly_level,
                biosample_query: self.biosample_query.clone(),
                contact_email: self.email.clone(),
            })
            .collect()
    }
}

/// List file first, then the `proteins` value, then the preset panel.
pub fn resolve_proteins(
    organism: &str,
    proteins: Option<&str>,
    protein_list: Option<&Path>,
) -> Result<Vec<String>, RefProtError> {
    let preset = OrganismPreset::lookup(organism);
    let names = if let Some(path) = protein_list {
        read_protein_list(path)?
    } else if let Some(selection) = proteins.map(str::trim).filter(|value| !value.is_empty()) {
        if selection.eq_ignore_ascii_case(ALL_PROTEINS) {
            preset
                .map(OrganismPreset::protein_panel)
                .ok_or_else(|| RefProtError::AllRequiresPreset(organism.to_string()))?
        } else {
            selection
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect()
        }
    } else {
        preset
            .map(OrganismPreset::protein_panel)
            .ok_or_else(|| RefProtError::MissingProteins(organism.to_string()))?
    };

    if names.is_empty() {
        return Err(RefProtError::EmptyProteinList);
    }
    Ok(names)
}

pub fn read_protein_list(path: &Path) -> Result<Vec<String>, RefProtError> {
    let content =
        fs::read_to_string(path).map_err(|_| RefProtError::ProteinListRead(path.to_path_buf()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
