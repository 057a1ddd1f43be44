use std::fs::{self, File};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{error, info};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::app::RunSummary;
use crate::config::RunPlan;
use crate::domain::RetrievalResult;
use crate::error::RefProtError;
use crate::report::RunReport;

const UNSAFE_FILENAME_CHARS: [char; 9] = ['|', '/', '\\', ':', '*', '?', '"', '<', '>'];

/// Files produced by a run; `None` when skipped or failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunArtifacts {
    pub csv: Option<String>,
    pub multi_fasta: Option<String>,
    pub html_report: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    #[serde(rename = "Protein_Name")]
    protein_name: &'a str,
    #[serde(rename = "Accession_Number")]
    accession: &'a str,
    #[serde(rename = "Protein_Length")]
    protein_length: usize,
    #[serde(rename = "Source_Strain")]
    source_strain: &'a str,
    #[serde(rename = "NCBI_URL")]
    ncbi_url: &'a str,
}

/// Writes every requested artifact into `dir`. A failing writer is logged
/// and does not stop the others.
pub fn write_outputs(report: &RunReport, plan: &RunPlan, dir: &Utf8Path) -> RunArtifacts {
    let base = &plan.output.base_name;
    let mut artifacts = RunArtifacts::default();

    let csv_path = dir.join(format!("{base}_accessions.csv"));
    artifacts.csv = finish("accession report", write_csv(report.results(), &csv_path), csv_path);

    if plan.output.multi_fasta {
        let path = dir.join(format!("{base}.fasta"));
        artifacts.multi_fasta =
            finish("multi-FASTA file", write_multi_fasta(report.results(), &path), path);
    }

    if plan.output.html_report {
        let path = dir.join(format!("{base}_report.html"));
        let html = render_html_report(report, plan);
        let written = fs::write(path.as_std_path(), html)
            .map_err(|err| RefProtError::Filesystem(err.to_string()));
        artifacts.html_report = finish("HTML report", written, path);
    }

    let zip_path = dir.join(format!("{base}.zip"));
    artifacts.zip = finish(
        "FASTA bundle",
        write_fasta_bundle(report.results(), dir, &zip_path),
        zip_path,
    );

    artifacts
}

fn finish(
    label: &str,
    written: Result<(), RefProtError>,
    path: Utf8PathBuf,
) -> Option<String> {
    match written {
        Ok(()) => {
            info!(path = %path, "{label} saved");
            Some(path.to_string())
        }
        Err(err) => {
            error!(path = %path, error = %err, "failed to write {label}");
            None
        }
    }
}

pub fn write_csv(results: &[RetrievalResult], path: &Utf8Path) -> Result<(), RefProtError> {
    let mut writer = csv::Writer::from_path(path.as_std_path())
        .map_err(|err| RefProtError::Filesystem(err.to_string()))?;
    for result in results {
        writer
            .serialize(CsvRow {
                protein_name: &result.protein_name,
                accession: &result.accession,
                protein_length: result.sequence_length,
                source_strain: &result.source_strain,
                ncbi_url: &result.ncbi_url,
            })
            .map_err(|err| RefProtError::Filesystem(err.to_string()))?;
    }
    writer
        .flush()
        .map_err(|err| RefProtError::Filesystem(err.to_string()))
}

pub fn write_multi_fasta(results: &[RetrievalResult], path: &Utf8Path) -> Result<(), RefProtError> {
    let mut file =
        File::create(path.as_std_path()).map_err(|err| RefProtError::Filesystem(err.to_string()))?;
    for result in results {
        file.write_all(result.raw_sequence_record.as_bytes())
            .map_err(|err| RefProtError::Filesystem(err.to_string()))?;
        if !result.raw_sequence_record.ends_with('\n') {
            file.write_all(b"\n")
                .map_err(|err| RefProtError::Filesystem(err.to_string()))?;
        }
    }
    Ok(())
}

pub fn fasta_file_name(result: &RetrievalResult) -> String {
    format!(
        "{}_{}.fasta",
        sanitize_file_component(&result.protein_name),
        sanitize_file_component(&result.accession)
    )
}

pub fn sanitize_file_component(value: &str) -> String {
    value.replace(UNSAFE_FILENAME_CHARS, "_")
}

/// Stages one FASTA file per result in a temporary directory next to the
/// archive, then packs them. The staging directory is always removed.
pub fn write_fasta_bundle(
    results: &[RetrievalResult],
    dir: &Utf8Path,
    zip_path: &Utf8Path,
) -> Result<(), RefProtError> {
    let staging = tempfile::Builder::new()
        .prefix("kira-refprot-fasta")
        .tempdir_in(dir.as_std_path())
        .map_err(|err| RefProtError::Filesystem(err.to_string()))?;

    let mut staged = Vec::with_capacity(results.len());
    for result in results {
        let name = fasta_file_name(result);
        let path = staging.path().join(&name);
        fs::write(&path, result.raw_sequence_record.as_bytes())
            .map_err(|err| RefProtError::Filesystem(err.to_string()))?;
        staged.push((name, path));
    }

    let file = File::create(zip_path.as_std_path())
        .map_err(|err| RefProtError::Filesystem(err.to_string()))?;
    let mut archive = zip::ZipWriter::new(file);
    for (name, path) in staged {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        archive
            .start_file(name, options)
            .map_err(|err| RefProtError::Filesystem(err.to_string()))?;
        let mut source =
            File::open(&path).map_err(|err| RefProtError::Filesystem(err.to_string()))?;
        io::copy(&mut source, &mut archive)
            .map_err(|err| RefProtError::Filesystem(err.to_string()))?;
    }
    archive
        .finish()
        .map_err(|err| RefProtError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn render_html_report(report: &RunReport, plan: &RunPlan) -> String {
    let mut rows = String::new();
    for result in report.results() {
        rows.push_str(&format!(
            "      <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td><a href=\"{}\" target=\"_blank\">View on NCBI</a></td></tr>\n",
            escape_html(&result.protein_name),
            escape_html(&result.accession),
            result.sequence_length,
            escape_html(&result.source_strain),
            escape_html(&result.ncbi_url),
        ));
    }
    let not_found = report
        .not_found()
        .iter()
        .map(|name| escape_html(name))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>kira-refprot report - {output}</title>
  <style>
    body {{ font-family: Arial, sans-serif; margin: 20px; }}
    .stats {{ display: flex; gap: 20px; }}
    .stat {{ background: #e8f4f8; padding: 15px; border-radius: 5px; flex: 1; text-align: center; }}
    table {{ width: 100%; border-collapse: collapse; margin-top: 20px; }}
    th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}
    th {{ background: #f2f2f2; }}
  </style>
</head>
<body>
  <h1>kira-refprot run report</h1>
  <p><strong>Output name:</strong> {output}</p>
  <p><strong>Organism:</strong> {organism}</p>
  <p><strong>Run date:</strong> {date}</p>
  <div class="stats">
    <div class="stat"><h3>{retrieved}</h3><p>Proteins retrieved</p></div>
    <div class="stat"><h3>{missing}</h3><p>Proteins not found</p></div>
    <div class="stat"><h3>{total}</h3><p>Total proteins</p></div>
  </div>
  <h2>Applied filters</h2>
  <p><strong>Assembly level:</strong> {assembly}</p>
  <p><strong>BioSample query:</strong> {biosample}</p>
  <p><strong>Not found:</strong> {not_found}</p>
  <h2>Retrieved proteins</h2>
  <table>
    <thead>
      <tr><th>Protein name</th><th>Accession</th><th>Length</th><th>Source strain</th><th>NCBI link</th></tr>
    </thead>
    <tbody>
{rows}    </tbody>
  </table>
</body>
</html>
"#,
        output = escape_html(&plan.output.base_name),
        organism = escape_html(&plan.organism),
        date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        retrieved = report.retrieved_count(),
        missing = report.not_found_count(),
        total = report.total(),
        assembly = plan
            .assembly_level
            .map(|level| level.to_string())
            .unwrap_or_else(|| "None".to_string()),
        biosample = plan
            .biosample_query
            .as_deref()
            .map(escape_html)
            .unwrap_or_else(|| "None".to_string()),
        not_found = if not_found.is_empty() { "-".to_string() } else { not_found },
        rows = rows,
    )
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_summary(summary: &RunSummary) -> io::Result<()> {
        let json = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">&'"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }

    #[test]
    fn sanitizes_reserved_characters() {
        assert_eq!(sanitize_file_component("ref|NP_414995.1|"), "ref_NP_414995.1_");
        assert_eq!(sanitize_file_component("a/b\\c:d*e?f\"g<h>"), "a_b_c_d_e_f_g_h_");
    }
}
