use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cap_upload_validator::catalog::CatalogLoader;
use cap_upload_validator::config::ConfigLoader;
use cap_upload_validator::error::CapError;
use cap_upload_validator::output::{JsonOutput, OutputMode};
use cap_upload_validator::reader::SnapshotReader;
use cap_upload_validator::validator::{ProgressEvent, ProgressSink, ValidationReport, Validator};

const ABOUT: &str = "Validate an AnnData h5ad file before upload to the Cell Annotation Platform";

const LONG_ABOUT: &str = "\
CLI tool to validate AnnData h5ad file before the upload to Cell Annotation Platform.
The validator reports CAP specific errors if the file does not follow the CAP AnnData Schema
from https://github.com/cellannotation/cell-annotation-schema/blob/main/docs/cap_anndata_schema.md

Full documentation with the list of possible validation errors is published in
https://github.com/cellannotation/cap-validator/wiki

The bundled reader expects the JSON snapshot encoding of an h5ad file
(optionally gzip-compressed). Binary HDF5 h5ad files are reported as
malformed datasets.

Usage Example:
capval path/to/anndata.h5ad";

#[derive(Parser)]
#[command(name = "capval")]
#[command(about = ABOUT, long_about = LONG_ABOUT)]
#[command(version, author)]
struct Cli {
    #[arg(help = "Path to the AnnData h5ad file.")]
    adata_path: Utf8PathBuf,

    #[arg(long, help = "Path to a capval.json config file")]
    config: Option<String>,

    #[arg(long, help = "Directory with per-organism gene catalog tables")]
    catalog_dir: Option<Utf8PathBuf>,

    #[arg(long, help = "Print the validation report as JSON")]
    json: bool,

    #[arg(long, help = "Do not print a message when validation passes")]
    quiet: bool,

    #[arg(long, short, help = "Print each validation stage to stderr")]
    verbose: bool,
}

struct StderrSink;

impl ProgressSink for StderrSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &CapError) -> u8 {
    if error.is_submission_defect() { 2 } else { 1 }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let catalog_dir = cli.catalog_dir.unwrap_or(config.catalog_dir);
    let validator = Validator::new(SnapshotReader::new(), CatalogLoader::new(catalog_dir));

    let sink: &dyn ProgressSink = if cli.verbose { &StderrSink } else { &JsonOutput };
    let report = match validator.inspect(&cli.adata_path, sink) {
        Ok(report) => report,
        Err(err) if err.is_submission_defect() => {
            eprintln!("{err}");
            return Ok(ExitCode::from(map_exit_code(&err)));
        }
        Err(err) => return Err(err.into()),
    };

    if matches!(output_mode, OutputMode::Json) {
        JsonOutput::print_report(&report).into_diagnostic()?;
    }

    let announce = matches!(output_mode, OutputMode::Human) && config.report_success && !cli.quiet;
    if report.passed && announce {
        print_success(&report);
    }

    match report.into_result() {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::from(map_exit_code(&err)))
        }
    }
}

fn print_success(report: &ValidationReport) {
    println!("Validation passed!");
    if let Some(organism) = &report.organism {
        println!("organism: {organism}");
    }
    println!("genes: {}", report.gene_ids.len());
}
