use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use cdcr_core::config_file::load_config;
use cdcr_core::{
    BatchOutcome, ClusterMap, Config, DetectorEngine, FileFailure, FileMentions, PdfBackend,
    Pipeline, PlainTextBackend, UploadedDocument, filter_mentions,
};
use cdcr_ner_onnx::detector_from_config;
use cdcr_pdf_mupdf::MupdfBackend;

mod output;

use output::ColorMode;

/// Cross-Document Coreference Resolution - detect entity mentions in
/// documents and cluster them across files
#[derive(Parser, Debug)]
#[command(name = "cdcr", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect and cluster mentions across one or more PDFs
    Analyze {
        /// Paths to the documents to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Ward distance below which clusters are merged
        #[arg(long)]
        threshold: Option<f64>,

        /// Number of documents processed concurrently
        #[arg(long)]
        workers: Option<usize>,

        /// Skip dates, years, money amounts and percentages
        #[arg(long)]
        no_numeric: bool,

        /// Mention detector: "model" (GLiNER ONNX) or "pattern" (rules)
        #[arg(long)]
        detector: Option<DetectorEngine>,

        /// GLiNER ONNX model file (overrides detection.model_path)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Treat inputs as UTF-8 text instead of PDF
        #[arg(long)]
        plain_text: bool,

        /// Print the result as JSON (same shape as the /upload response)
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,

        /// Path to output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Filter a saved analysis result by substring
    Filter {
        /// JSON produced by `analyze --json` or the /upload endpoint
        result: PathBuf,

        /// Case-insensitive substring to look for
        #[arg(long)]
        value: String,

        /// Print the result as JSON (same shape as the /filter response)
        #[arg(long)]
        json: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

/// Analysis result as written by `analyze --json` and `/upload`.
#[derive(Debug, Serialize, Deserialize)]
struct SavedResult {
    #[serde(default)]
    file_mentions: FileMentions,
    #[serde(default)]
    clusters: ClusterMap,
    #[serde(default)]
    file_paths: Vec<String>,
    #[serde(default)]
    failures: Vec<FileFailure>,
}

impl From<BatchOutcome> for SavedResult {
    fn from(outcome: BatchOutcome) -> Self {
        SavedResult {
            file_mentions: outcome.file_mentions,
            clusters: outcome.clusters,
            file_paths: outcome.processed,
            failures: outcome.failures,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Analyze {
            files,
            threshold,
            workers,
            no_numeric,
            detector,
            model,
            plain_text,
            json,
            no_color,
            output,
        } => {
            let mut config = Config::from_file(&load_config());
            if let Some(threshold) = threshold {
                config.distance_threshold = threshold;
            }
            if let Some(workers) = workers {
                config.num_workers = workers.max(1);
            }
            if no_numeric {
                config.include_numeric = false;
            }
            if let Some(engine) = detector {
                config.detector_engine = engine;
            }
            if let Some(model) = model {
                config.ner_model = Some(model);
            }
            analyze(&files, config, plain_text, json, no_color, output).await
        }
        Command::Filter {
            result,
            value,
            json,
            no_color,
        } => filter(&result, &value, json, no_color),
    }
}

async fn analyze(
    files: &[PathBuf],
    mut config: Config,
    plain_text: bool,
    json: bool,
    no_color: bool,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    anyhow::ensure!(
        config.distance_threshold.is_finite() && config.distance_threshold > 0.0,
        "--threshold must be a positive number, got {}",
        config.distance_threshold
    );

    let docs = files
        .iter()
        .map(|path| read_document(path.as_path()))
        .collect::<anyhow::Result<Vec<_>>>()?;

    // Uploads are copied into a scratch directory that goes away on exit.
    let scratch = tempfile::tempdir().context("Failed to create temp directory")?;
    config.upload_dir = scratch.path().to_path_buf();
    config.scope_per_request = false;

    let backend: Arc<dyn PdfBackend> = if plain_text {
        Arc::new(PlainTextBackend)
    } else {
        Arc::new(MupdfBackend::new())
    };
    let detector = detector_from_config(&config).context("Failed to set up mention detection")?;
    let outcome = Pipeline::from_config(&config, backend, detector)
        .process_batch(docs)
        .await?;

    let use_color = !no_color && !json && output.is_none();
    let color = ColorMode(use_color);
    let mut writer: Box<dyn Write> = if let Some(ref output_path) = output {
        Box::new(
            std::fs::File::create(output_path)
                .with_context(|| format!("Failed to create {}", output_path.display()))?,
        )
    } else {
        Box::new(std::io::stdout())
    };

    if json {
        serde_json::to_writer_pretty(&mut writer, &SavedResult::from(outcome))?;
        writeln!(writer)?;
    } else {
        output::print_file_mentions(&mut writer, &outcome.file_mentions, color)?;
        output::print_clusters(&mut writer, &outcome.clusters, color)?;
        output::print_failures(&mut writer, &outcome.failures, color)?;
        output::print_summary(&mut writer, &outcome, color)?;
    }
    writer.flush()?;
    Ok(())
}

fn read_document(path: &Path) -> anyhow::Result<UploadedDocument> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?
        .to_string();
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(UploadedDocument { filename, data })
}

fn filter(result: &Path, value: &str, json: bool, no_color: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(result)
        .with_context(|| format!("Failed to read {}", result.display()))?;
    let saved: SavedResult = serde_json::from_str(&content)
        .with_context(|| format!("{} is not an analysis result", result.display()))?;

    let outcome = filter_mentions(value, &saved.clusters, &saved.file_mentions)?;

    let mut stdout = std::io::stdout();
    if json {
        serde_json::to_writer_pretty(&mut stdout, &outcome)?;
        writeln!(stdout)?;
    } else {
        output::print_filter_result(&mut stdout, value, &outcome, ColorMode(!no_color))?;
    }
    Ok(())
}
