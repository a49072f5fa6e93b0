use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

use statement_ledger::{
    discover_documents, JsonGridExtractor, Pipeline, PipelineConfig, PipelineEvent, VERSION,
};

#[derive(Parser, Debug)]
#[command(
    name = "statement-ledger",
    version,
    about = "Build a deduplicated, balance-checked ledger from bank statement tables"
)]
struct Cli {
    /// Folder with the statement documents (and their .tables.json grids)
    input: PathBuf,

    /// Folder for the CSV/XLSX outputs
    output: PathBuf,

    /// TOML file overriding the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    workers: Option<usize>,

    /// Per-document time limit in seconds (0 = no limit)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// File-name pattern for documents, e.g. "*.pdf"
    #[arg(long)]
    pattern: Option<String>,

    /// Print the run summary as JSON on stdout
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    tracing::info!("statement-ledger {}", VERSION);

    let documents = discover_documents(&cli.input, &config.document_pattern)?;
    let (tx, rx) = mpsc::channel();
    let pipeline = Pipeline::new(config, Arc::new(JsonGridExtractor::new()))?.with_events(tx);

    // Progress lines on stderr while the run is going
    let progress = thread::spawn(move || {
        for event in rx {
            render(&event);
        }
    });

    let summary = pipeline.run(&documents, &cli.output);
    drop(pipeline);
    let _ = progress.join();
    let summary = summary?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?
        );
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(workers) = cli.workers {
        config.workers = workers;
    }
    if let Some(secs) = cli.timeout_secs {
        config.document_timeout_secs = if secs == 0 { None } else { Some(secs) };
    }
    if let Some(pattern) = &cli.pattern {
        config.document_pattern = pattern.clone();
    }

    config.validate()?;
    Ok(config)
}

fn render(event: &PipelineEvent) {
    match event {
        PipelineEvent::Started { documents, workers, .. } => {
            eprintln!("📂 {} documents, {} workers", documents, workers);
        }
        PipelineEvent::DocumentProcessed { document, records, .. } => {
            eprintln!("✓ {} ({} records)", document, records);
        }
        PipelineEvent::DocumentSkipped { document, reason, .. } => {
            eprintln!("⚠️  {} skipped: {}", document, reason);
        }
        PipelineEvent::Merged { records, duplicates } => {
            eprintln!("🔗 merged {} records ({} duplicates removed)", records, duplicates);
        }
        PipelineEvent::Reconciled {
            checked,
            discrepancies,
            unavailable,
        } => {
            eprintln!(
                "⚖️  {} balances checked, {} discrepancies, {} unavailable",
                checked, discrepancies, unavailable
            );
        }
        PipelineEvent::Finished { .. } => eprintln!("🎉 done"),
    }
}
