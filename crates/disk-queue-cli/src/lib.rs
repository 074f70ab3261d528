//! # Disk Queue CLI
//!
//! Command-line interface over a disk-persisted queue.
//!
//! This module provides CLI commands for:
//! - Offering and polling JSON items
//! - Inspecting queue size, location and backend
//! - Compacting the store
//!
//! Each invocation is one short-lived handle among possibly many processes
//! sharing the location. Commands release their handles without the queue's
//! teardown: the flat-file lock file stays in place for concurrent
//! invocations and SQLite space is reclaimed only by `compact`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use disk_queue::{DiskQueue, QueueConfig, QueueError};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Prefix of environment variables read as configuration (`DISK_QUEUE__PATH`)
pub const ENV_PREFIX: &str = "DISK_QUEUE";

// ============================================================================
// CLI Structure
// ============================================================================

/// Disk-queue CLI - inspect and drive a disk-persisted queue
#[derive(Parser, Debug)]
#[command(name = "disk-queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offer, poll and inspect a disk-persisted queue")]
#[command(
    long_about = "Offer, poll and inspect a disk-persisted queue.\n\n\
Commands may run concurrently against one location. Handles are released \
without teardown, so the lock file is kept and SQLite space is reclaimed \
only by the `compact` command."
)]
pub struct Cli {
    /// Configuration file path (TOML or YAML)
    #[arg(short, long, env = "DISK_QUEUE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Queue storage location
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Selection discipline: oldest-first or newest-first
    #[arg(short, long)]
    pub discipline: Option<String>,

    /// Logging level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add an item to the queue
    Offer {
        /// Item as JSON (`{"id": 1}`, `"text"`, `42`)
        value: String,

        /// Store the argument as a JSON string instead of parsing it
        #[arg(short, long)]
        raw: bool,
    },

    /// Remove and print the next item
    Poll,

    /// Print the number of stored items
    Count,

    /// Show location, backend, discipline and size
    Status,

    /// Print the resolved storage location
    Path,

    /// Reclaim space left by removed items
    Compact,
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

// ============================================================================
// Errors
// ============================================================================

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0:#}")]
    Configuration(#[from] anyhow::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Output encoding failed: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(e) if e.is_transient() => 3,
            Self::Queue(_) => 2,
            Self::InvalidArgument { .. } => 4,
            Self::Output(_) => 5,
        }
    }
}

// ============================================================================
// Status Output
// ============================================================================

/// Snapshot printed by the `status` command
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueStatus {
    pub path: PathBuf,
    pub backend: String,
    pub discipline: String,
    pub count: usize,
    pub empty: bool,
}

// ============================================================================
// Entry Points
// ============================================================================

/// Parse arguments, run the command and print its output
pub fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    let output = run(&cli)?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("disk_queue={level},disk_queue_cli={level}"))
    });
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries command output.
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(e) = result {
        debug!("Logging already initialized: {}", e);
    }
}

/// Load configuration from the file, the environment and the command line.
///
/// Sources (applied in order, later sources override earlier ones):
///  1. Built-in defaults (`oldest-first`)
///  2. The file given by `--config` / `DISK_QUEUE_CONFIG`
///  3. Environment variables prefixed `DISK_QUEUE__`, e.g. `DISK_QUEUE__DISCIPLINE`
///  4. `--path` and `--discipline`
pub fn load_config(cli: &Cli) -> Result<QueueConfig, CliError> {
    let mut builder = config::Config::builder()
        .set_default("discipline", "oldest-first")
        .context("Failed to set configuration defaults")?;

    if let Some(file) = &cli.config {
        builder = builder.add_source(config::File::from(file.as_path()).required(true));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option(
            "path",
            cli.path.as_ref().map(|p| p.to_string_lossy().into_owned()),
        )
        .context("Invalid --path")?
        .set_override_option("discipline", cli.discipline.clone())
        .context("Invalid --discipline")?
        .build()
        .context("Failed to load configuration")?;

    let config = settings
        .try_deserialize::<QueueConfig>()
        .context("Invalid queue configuration")?;
    Ok(config)
}

/// Run the parsed command against the configured queue and return its output
pub fn run(cli: &Cli) -> Result<String, CliError> {
    let config = load_config(cli)?;
    let queue: DiskQueue<Value> = DiskQueue::open(config)?;
    run_on(cli, queue)
}

/// Run the parsed command against `queue`, then release it.
///
/// The queue is dropped rather than closed; `close` would delete the lock
/// file other processes may be waiting on.
pub fn run_on(cli: &Cli, queue: DiskQueue<Value>) -> Result<String, CliError> {
    info!(path = %queue.queue_file().display(), "Running {:?}", cli.command);
    let output = execute(&cli.command, cli.format, &queue);
    drop(queue);
    output
}

/// Execute one command against an open queue
pub fn execute(
    command: &Commands,
    format: OutputFormat,
    queue: &DiskQueue<Value>,
) -> Result<String, CliError> {
    match command {
        Commands::Offer { value, raw } => {
            let item = parse_item(value, *raw)?;
            let written = queue.offer(&item)?;
            Ok(match format {
                OutputFormat::Text => (if written { "ok" } else { "not written" }).to_string(),
                OutputFormat::Json => serde_json::json!({ "written": written }).to_string(),
            })
        }
        Commands::Poll => {
            let item = queue.poll()?;
            Ok(match (format, item) {
                (OutputFormat::Text, Some(value)) => value.to_string(),
                (OutputFormat::Text, None) => "(empty)".to_string(),
                (OutputFormat::Json, item) => serde_json::json!({ "item": item }).to_string(),
            })
        }
        Commands::Count => {
            let count = queue.count_items()?;
            Ok(match format {
                OutputFormat::Text => count.to_string(),
                OutputFormat::Json => serde_json::json!({ "count": count }).to_string(),
            })
        }
        Commands::Status => {
            let count = queue.count_items()?;
            let status = QueueStatus {
                path: queue.queue_file().to_path_buf(),
                backend: queue.backend_kind().to_string(),
                discipline: queue.discipline().to_string(),
                count,
                empty: count == 0,
            };
            match format {
                OutputFormat::Text => Ok(format!(
                    "path:       {}\nbackend:    {}\ndiscipline: {}\ncount:      {}\nempty:      {}",
                    status.path.display(),
                    status.backend,
                    status.discipline,
                    status.count,
                    status.empty
                )),
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&status)?),
            }
        }
        Commands::Path => Ok(match format {
            OutputFormat::Text => queue.queue_file().display().to_string(),
            OutputFormat::Json => serde_json::json!({ "path": queue.queue_file() }).to_string(),
        }),
        Commands::Compact => {
            queue.compact()?;
            Ok(match format {
                OutputFormat::Text => "compacted".to_string(),
                OutputFormat::Json => serde_json::json!({ "compacted": true }).to_string(),
            })
        }
    }
}

/// Interpret an `offer` argument as JSON, or as a plain string when `raw`
pub fn parse_item(value: &str, raw: bool) -> Result<Value, CliError> {
    if raw {
        return Ok(Value::String(value.to_string()));
    }
    serde_json::from_str(value).map_err(|e| CliError::InvalidArgument {
        message: format!("'{}' is not valid JSON ({}); use --raw to store it as text", value, e),
    })
}
