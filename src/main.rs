//! # docsmith CLI
//!
//! Generates Markdown documentation for Python source files through the
//! chunked-generation pipeline.
//!
//! ## Usage
//!
//! ```bash
//! docsmith --config ./config/docsmith.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docsmith init` | Create the SQLite cache database |
//! | `docsmith split <file>` | Dry run: show the chunk plan without calling the backend |
//! | `docsmith generate <file>` | Generate documentation (requires `ANTHROPIC_API_KEY`) |

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docsmith::backend::AnthropicBackend;
use docsmith::config::{load_config, Config};
use docsmith::kv::SqliteKvStore;
use docsmith::models::SourceUnit;
use docsmith::pipeline::Pipeline;
use docsmith::splitter::split;

/// docsmith — LLM documentation generation with chunking, caching, and retry.
#[derive(Parser)]
#[command(
    name = "docsmith",
    about = "Generate documentation for source files via an LLM backend",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docsmith.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the cache database. Idempotent.
    Init,

    /// Show the chunk plan for a file without calling the backend.
    Split {
        /// Python source file.
        file: PathBuf,
    },

    /// Generate documentation for a file.
    Generate {
        /// Python source file.
        file: PathBuf,

        /// Write the Markdown here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&config).await,
        Commands::Split { file } => run_split(&config, &file),
        Commands::Generate { file, output } => run_generate(&config, &file, output.as_deref()).await,
    }
}

async fn run_init(config: &Config) -> Result<()> {
    SqliteKvStore::connect(&config.cache.db_path).await?;
    println!("cache database initialized at {}", config.cache.db_path.display());
    Ok(())
}

fn read_source(path: &Path) -> Result<SourceUnit> {
    if path.extension().and_then(|e| e.to_str()) != Some("py") {
        bail!("only Python files (.py) are supported: {}", path.display());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if content.trim().is_empty() {
        bail!("{} is empty", path.display());
    }

    Ok(SourceUnit::new(path.display().to_string(), content))
}

fn run_split(config: &Config, file: &Path) -> Result<()> {
    let unit = read_source(file)?;

    println!("split {}", unit.identifier);
    println!("  total lines: {}", unit.size_lines);

    if unit.size_lines <= config.chunking.threshold_lines {
        println!(
            "  no chunking needed (threshold: {} lines)",
            config.chunking.threshold_lines
        );
        return Ok(());
    }

    let outcome = split(
        &unit,
        config.chunking.threshold_lines,
        config.chunking.overlap_lines,
    )?;

    if outcome.fallback_single {
        println!("  warning: no top-level functions or classes; single oversized chunk");
    }

    println!("  chunks: {}", outcome.chunks.len());
    for chunk in &outcome.chunks {
        let contains = if chunk.unit_names.is_empty() {
            "-".to_string()
        } else {
            chunk.unit_names.join(", ")
        };
        println!(
            "    [{}] lines {}-{} ({} lines): {}",
            chunk.sequence_index,
            chunk.start_line,
            chunk.end_line,
            chunk.size_lines(),
            contains
        );
    }
    println!("ok");

    Ok(())
}

async fn run_generate(config: &Config, file: &Path, output: Option<&Path>) -> Result<()> {
    let unit = read_source(file)?;

    let store = Arc::new(SqliteKvStore::connect(&config.cache.db_path).await?);
    let backend = Arc::new(AnthropicBackend::new(&config.backend)?);
    let pipeline = Pipeline::new(config, backend, store);

    let result = pipeline.generate(unit).await?;

    match output {
        Some(path) => {
            std::fs::write(path, &result.documentation)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote documentation to {}", path.display());
        }
        None => println!("{}", result.documentation),
    }

    eprintln!("generate {}", result.identifier);
    eprintln!("  request id: {}", result.request_id);
    eprintln!("  cached: {}", result.was_cached);
    eprintln!(
        "  tokens: {} in / {} out",
        result.input_tokens, result.output_tokens
    );
    eprintln!("  cost: ${:.6}", result.cost);
    if let Some(report) = &result.chunks {
        eprintln!(
            "  chunks: {} ({} cache hits, {} misses, {} failed)",
            report.total_chunks, report.cache_hits, report.cache_misses, report.failed_chunks
        );
    }
    eprintln!("  elapsed: {} ms", result.elapsed_ms);
    eprintln!("ok");

    Ok(())
}
