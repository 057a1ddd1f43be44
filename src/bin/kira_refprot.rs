use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

use kira_refprot::app::{App, RunSummary};
use kira_refprot::cache::JsonFileCache;
use kira_refprot::config::{ConfigLoader, RunInputs, RunPlan};
use kira_refprot::domain::AssemblyLevel;
use kira_refprot::engine::{MetadataPolicy, Retriever};
use kira_refprot::error::RefProtError;
use kira_refprot::ncbi::EntrezHttpClient;
use kira_refprot::output::JsonOutput;

#[derive(Parser)]
#[command(name = "kira-refprot")]
#[command(about = "Retrieve reference protein sequences from NCBI with graduated query relaxation")]
#[command(
    after_help = "Example: kira-refprot --organism \"Pseudomonas aeruginosa PAO1\" --proteins dnaA,recA --assembly-level complete_genome --output PAO1_refs --email user@example.com"
)]
#[command(version, author)]
struct Cli {
    /// Target organism: free text or a preset key (ecoli, klebsiella).
    #[arg(long)]
    organism: Option<String>,

    /// Comma-separated protein names, or `all` for the preset panel.
    #[arg(long)]
    proteins: Option<String>,

    /// File with one protein name per line.
    #[arg(long)]
    protein_list: Option<PathBuf>,

    /// YAML file with run parameters; its values override flags.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    assembly_level: Option<AssemblyLevel>,

    /// Extra BioSample query ANDed to every search, e.g. "host=human".
    #[arg(long)]
    biosample_query: Option<String>,

    /// Base name for output files.
    #[arg(long)]
    output: Option<String>,

    #[arg(long)]
    multi_fasta: bool,

    #[arg(long)]
    html_report: bool,

    /// Contact email sent to NCBI E-utilities.
    #[arg(long)]
    email: Option<String>,

    #[arg(long, value_enum, default_value_t = MetadataPolicy::Degrade)]
    metadata_policy: MetadataPolicy,

    /// Directory holding query_cache.json.
    #[arg(long, conflicts_with = "global_cache")]
    cache_dir: Option<Utf8PathBuf>,

    /// Use the per-user cache under ~/.cache/kira-refprot.
    #[arg(long)]
    global_cache: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<RefProtError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &RefProtError) -> u8 {
    if error.is_configuration() { 2 } else { 1 }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let log_file = init_logging();

    let mut inputs = RunInputs {
        organism: cli.organism,
        proteins: cli.proteins,
        protein_list: cli.protein_list,
        assembly_level: cli.assembly_level,
        biosample_query: cli.biosample_query,
        output: cli.output,
        multi_fasta: cli.multi_fasta,
        html_report: cli.html_report,
        email: cli.email,
    };
    if let Some(path) = &cli.config {
        let file = ConfigLoader::load(path)?;
        inputs = inputs.merge(file)?;
    }
    let plan = RunPlan::resolve(inputs)?;
    attach_log_file(&log_file, &plan.output.log_file_name());

    let cache = match (cli.cache_dir, cli.global_cache) {
        (Some(dir), _) => JsonFileCache::in_dir(&dir),
        (None, true) => JsonFileCache::global()?,
        (None, false) => JsonFileCache::project()?,
    };
    tracing::debug!(path = %cache.path(), "query cache");

    let entrez = EntrezHttpClient::new(&plan.email)?;
    let retriever = Retriever::new(entrez, cache).with_policy(cli.metadata_policy);
    let app = App::new(retriever);

    let output_dir = Utf8PathBuf::from(".");
    let summary = app.run(&plan, &output_dir);

    if cli.json {
        JsonOutput::print_summary(&summary).into_diagnostic()?;
    } else {
        print_summary(&summary);
    }
    Ok(())
}

type LogFileLayer = fmt::Layer<Registry, DefaultFields, Format, Mutex<File>>;
type LogFileHandle = reload::Handle<Option<LogFileLayer>, Registry>;

// Console logging starts before the config is read; the run log joins
// once the plan names it, so a rejected run leaves no log file behind.
fn init_logging() -> LogFileHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_layer, handle) = reload::Layer::new(None);
    tracing_subscriber::registry()
        .with(file_layer)
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
    handle
}

fn attach_log_file(handle: &LogFileHandle, log_path: &str) {
    let file = match File::create(log_path) {
        Ok(file) => file,
        Err(err) => {
            tracing::warn!(path = log_path, error = %err, "cannot open run log, logging to stderr only");
            return;
        }
    };
    let layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file));
    if let Err(err) = handle.reload(Some(layer)) {
        tracing::warn!(path = log_path, error = %err, "cannot attach run log");
    }
}

fn print_summary(summary: &RunSummary) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";
    let report = &summary.report;

    println!("{cyan}kira-refprot summary ({}){reset}", report.organism);
    println!(
        "{green}retrieved: {} / {}{reset}",
        report.retrieved_count(),
        report.total()
    );
    for result in report.results() {
        println!(
            "{green}  {} -> {} ({} aa, {}){reset}",
            result.protein_name, result.accession, result.sequence_length, result.source_strain
        );
    }
    let not_found = report.not_found();
    if !not_found.is_empty() {
        println!("{yellow}not found: {}{reset}", not_found.join(", "));
    }

    let artifacts = &summary.artifacts;
    for path in [
        &artifacts.csv,
        &artifacts.multi_fasta,
        &artifacts.html_report,
        &artifacts.zip,
    ]
    .into_iter()
    .flatten()
    {
        println!("{cyan}  wrote {path}{reset}");
    }
}
