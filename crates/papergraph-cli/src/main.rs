use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use papergraph_core::config_file::load_config;
use papergraph_core::pipeline::IngestSettings;
use papergraph_core::{
    ChatCompletionClient, Config, GraphStore, IngestEvent, IngestOutcome, Ingestor,
};
use papergraph_pdf_mupdf::MupdfBackend;

mod output;

use output::ColorMode;

/// Paper graph builder - extract papers from PDFs into a citation graph database
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database (overrides PAPERGRAPH_DB and config files)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the nodes, metadata and edges tables and show row counts
    Setup,

    /// Show the column layout of each table
    Schema,

    /// Ingest a single paper PDF under the given identifier
    Ingest {
        /// Identifier to store the paper under
        arxiv_id: String,

        /// Path to the paper PDF
        pdf_path: PathBuf,

        /// Groq API key (default: GROQ_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Model name
        #[arg(long)]
        model: Option<String>,
    },

    /// Ingest every PDF in a directory, in file-name order
    IngestAll {
        /// Directory containing paper PDFs
        dir: PathBuf,

        /// Groq API key (default: GROQ_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Model name
        #[arg(long)]
        model: Option<String>,

        /// Seconds to wait between papers
        #[arg(long)]
        pacing_secs: Option<u64>,
    },

    /// Print a verification report for one table
    Verify {
        #[arg(value_enum)]
        table: Table,
    },

    /// Test the database connection and print graph statistics
    Diagnose,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Table {
    Nodes,
    Edges,
    Metadata,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    // Resolve configuration: CLI flags > env vars > config files > defaults
    let mut config = Config::from_file(&load_config()).with_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    tracing::debug!(?config, "resolved configuration");

    let color = ColorMode(!cli.no_color);
    let mut out = std::io::stdout();

    match cli.command {
        Command::Setup => setup(&config, &mut out, color),
        Command::Schema => {
            let store = open_existing(&config)?;
            output::print_schema(&mut out, &store.schema_report()?, color)?;
            Ok(())
        }
        Command::Ingest {
            arxiv_id,
            pdf_path,
            api_key,
            model,
        } => {
            apply_llm_overrides(&mut config, api_key, model);
            ingest(&config, &arxiv_id, &pdf_path, &mut out, color).await
        }
        Command::IngestAll {
            dir,
            api_key,
            model,
            pacing_secs,
        } => {
            apply_llm_overrides(&mut config, api_key, model);
            if let Some(secs) = pacing_secs {
                config.pacing_secs = secs;
            }
            ingest_all(&config, &dir, &mut out, color).await
        }
        Command::Verify { table } => {
            let store = open_existing(&config)?;
            match table {
                Table::Nodes => output::print_nodes_report(&mut out, &store.nodes_report()?, color)?,
                Table::Edges => output::print_edges_report(&mut out, &store.edges_report()?, color)?,
                Table::Metadata => {
                    output::print_metadata_report(&mut out, &store.metadata_report()?, color)?
                }
            }
            Ok(())
        }
        Command::Diagnose => diagnose(&config, &mut out, color),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_llm_overrides(config: &mut Config, api_key: Option<String>, model: Option<String>) {
    if let Some(key) = api_key {
        config.api_key = Some(key);
    }
    if let Some(model) = model {
        config.model = model;
    }
}

fn open_existing(config: &Config) -> anyhow::Result<GraphStore> {
    GraphStore::open_existing(&config.db_path)
        .with_context(|| format!("cannot open database {}", config.db_path.display()))
}

fn open_for_ingest(config: &Config) -> anyhow::Result<GraphStore> {
    let store = GraphStore::open(&config.db_path)
        .with_context(|| format!("cannot open database {}", config.db_path.display()))?;
    store.init_schema()?;
    Ok(store)
}

fn setup(config: &Config, out: &mut dyn Write, color: ColorMode) -> anyhow::Result<()> {
    let store = GraphStore::open(&config.db_path)
        .with_context(|| format!("cannot open database {}", config.db_path.display()))?;
    let report = store.setup()?;
    output::print_setup(out, &config.db_path, &report, color)?;
    Ok(())
}

async fn ingest(
    config: &Config,
    arxiv_id: &str,
    pdf_path: &Path,
    out: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<()> {
    if !pdf_path.exists() {
        anyhow::bail!("File not found: {}", pdf_path.display());
    }

    let store = open_for_ingest(config)?;
    let llm = ChatCompletionClient::from_config(config)?;
    let pdf = MupdfBackend::new();
    let ingestor = Ingestor::new(&store, &pdf, &llm, IngestSettings::from(config));

    output::print_ingest_header(out, arxiv_id, pdf_path, color)?;
    let progress = |event: IngestEvent| {
        let mut w = std::io::stdout();
        let _ = output::print_event(&mut w, &event, color);
        let _ = w.flush();
    };

    let outcome = ingestor
        .ingest_paper(arxiv_id, pdf_path, &progress)
        .await
        .with_context(|| format!("failed to ingest {arxiv_id}"))?;

    if let IngestOutcome::Ingested { characters, .. } = outcome {
        tracing::info!(arxiv_id, characters, "ingest finished");
    }
    Ok(())
}

async fn ingest_all(
    config: &Config,
    dir: &Path,
    out: &mut dyn Write,
    color: ColorMode,
) -> anyhow::Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("Directory not found: {}", dir.display());
    }

    let store = open_for_ingest(config)?;
    let llm = ChatCompletionClient::from_config(config)?;
    let pdf = MupdfBackend::new();
    let ingestor = Ingestor::new(&store, &pdf, &llm, IngestSettings::from(config));

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let progress = |event: IngestEvent| {
        match &event {
            IngestEvent::BatchStarted { total, .. } => bar.set_length(*total as u64),
            IngestEvent::PaperStarted {
                index, file_name, ..
            } => {
                bar.set_position(*index as u64 - 1);
                bar.set_message(file_name.clone());
            }
            IngestEvent::Saved { .. }
            | IngestEvent::AlreadyPresent { .. }
            | IngestEvent::PaperFailed { .. } => bar.inc(1),
            _ => {}
        }
        bar.suspend(|| {
            let mut w = std::io::stdout();
            let _ = output::print_event(&mut w, &event, color);
            let _ = w.flush();
        });
    };

    let summary = ingestor.ingest_directory(dir, &progress).await?;
    bar.finish_and_clear();

    output::print_batch_summary(out, &summary, color)?;
    let (total, recent) = store.recent_papers(5)?;
    output::print_recent_papers(out, total, &recent, color)?;
    Ok(())
}

fn diagnose(config: &Config, out: &mut dyn Write, color: ColorMode) -> anyhow::Result<()> {
    let store = match GraphStore::open_existing(&config.db_path) {
        Ok(store) => store,
        Err(e) => {
            output::print_connection_failure(out, &config.db_path, &e.to_string(), color)?;
            out.flush()?;
            std::process::exit(1);
        }
    };
    let diagnostic = match store.diagnose() {
        Ok(d) => d,
        Err(e) => {
            output::print_connection_failure(out, &config.db_path, &e.to_string(), color)?;
            out.flush()?;
            std::process::exit(1);
        }
    };
    output::print_diagnostic(out, &config.db_path, &diagnostic, color)?;
    Ok(())
}
