//! # azqueue CLI
//!
//! Command-line front end for an azqueue ledger.
//!
//! This module provides CLI commands for:
//! - Enqueueing, leasing, extending and deleting messages
//! - Counting and purging queues
//! - Validating and printing the resolved configuration
//!
//! Command output goes to stdout; logs go to stderr so the output can be
//! piped into other tools.

use azqueue::{
    ConfigurationError, LeaseOptions, LeasedMessage, LedgerConfig, MessageId, PopReceipt,
    QueueError, QueueName, QueueStore, QueueStoreFactory, StoreConfig, ValidationError,
};
use bytes::Bytes;
use chrono::Duration;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// azqueue - lease-based message queue
#[derive(Parser, Debug)]
#[command(name = "azqueue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Lease-based message queue over a SQLite ledger")]
#[command(
    long_about = "azqueue stores messages in a SQLite ledger and hands them out under \
                  visibility-timeout leases with pop receipts"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "AZQUEUE_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database path, overriding the configured ledger
    #[arg(short, long, env = "AZQUEUE_DATABASE")]
    pub database: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enqueue a message and print its id
    Put {
        /// Queue name
        queue: String,

        /// Message body, or `-` to read it from stdin
        body: String,

        /// Seconds before the message becomes visible
        #[arg(long, default_value = "0")]
        visibility_timeout: u64,

        /// Seconds until the message expires (defaults to the configured TTL)
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Lease visible messages
    Lease {
        /// Queue name
        queue: String,

        /// Seconds the leased messages stay hidden (defaults to the configured timeout)
        #[arg(long)]
        visibility_timeout: Option<u64>,

        /// Maximum number of messages to lease
        #[arg(short, long, default_value = "1")]
        max_messages: u32,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a leased message
    Delete {
        /// Queue name
        queue: String,

        /// Message id
        message_id: String,

        /// Pop receipt from the most recent lease or extension
        pop_receipt: String,
    },

    /// Extend a lease and print the new pop receipt
    Extend {
        /// Queue name
        queue: String,

        /// Message id
        message_id: String,

        /// Pop receipt from the most recent lease or extension
        pop_receipt: String,

        /// Replacement message body
        #[arg(short, long)]
        body: Option<String>,

        /// Seconds from now until the message becomes visible again
        #[arg(long, default_value = "30")]
        visibility_timeout: u64,
    },

    /// Print the number of unexpired messages
    Count {
        /// Queue name
        queue: String,
    },

    /// Remove expired messages from the ledger
    Purge,

    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// Output format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
pub enum OutputFormat {
    /// One tab-separated line per message, with the body's backslashes,
    /// tabs and line breaks escaped
    Text,
    /// JSON array
    Json,
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue error: {0}")]
    Queue(QueueError),

    #[error("Lease mismatch for message {message_id}")]
    LeaseMismatch { message_id: String },

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Process exit code for this error family
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(_) => 2,
            Self::LeaseMismatch { .. } => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Io(_) => 5,
        }
    }

    fn invalid(arg: &str, err: impl std::fmt::Display) -> Self {
        Self::InvalidArgument {
            arg: arg.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<QueueError> for CliError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::LeaseMismatch { message_id } => Self::LeaseMismatch { message_id },
            QueueError::Configuration(e) => Self::Configuration(e),
            QueueError::Validation(e) => Self::from(e),
            other => Self::Queue(other),
        }
    }
}

impl From<ValidationError> for CliError {
    fn from(err: ValidationError) -> Self {
        let arg = match &err {
            ValidationError::Required { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::OutOfRange { field, .. } => field.clone(),
        };
        Self::InvalidArgument {
            arg,
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Output Types
// ============================================================================

/// Leased message as printed by `lease --format json`
#[derive(Debug, Serialize)]
pub struct LeasedMessageView {
    pub message_id: String,
    pub message_text: String,
    pub pop_receipt: String,
    pub dequeue_count: u32,
    pub inserted_at: String,
    pub expires_at: String,
    pub next_visible_at: String,
}

impl From<&LeasedMessage> for LeasedMessageView {
    fn from(message: &LeasedMessage) -> Self {
        Self {
            message_id: message.message_id.to_string(),
            message_text: String::from_utf8_lossy(&message.body).into_owned(),
            pop_receipt: message.pop_receipt.to_string(),
            dequeue_count: message.dequeue_count,
            inserted_at: message.inserted_at.to_string(),
            expires_at: message.expires_at.to_string(),
            next_visible_at: message.next_visible_at.to_string(),
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Parse arguments, initialise logging and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    execute(cli, &mut out).await
}

/// Run a parsed command, writing its output to `out`
pub async fn execute(cli: Cli, out: &mut dyn Write) -> Result<(), CliError> {
    let config = load_configuration(&cli)?;

    if let Commands::Config { show, format } = &cli.command {
        return execute_config_command(&config, *show, format, out);
    }

    let store = open_store(config).await?;

    match cli.command {
        Commands::Put {
            queue,
            body,
            visibility_timeout,
            ttl,
        } => execute_put_command(&store, &queue, &body, visibility_timeout, ttl, out).await,
        Commands::Lease {
            queue,
            visibility_timeout,
            max_messages,
            format,
        } => {
            execute_lease_command(&store, &queue, visibility_timeout, max_messages, format, out)
                .await
        }
        Commands::Delete {
            queue,
            message_id,
            pop_receipt,
        } => execute_delete_command(&store, &queue, &message_id, &pop_receipt).await,
        Commands::Extend {
            queue,
            message_id,
            pop_receipt,
            body,
            visibility_timeout,
        } => {
            execute_extend_command(
                &store,
                &queue,
                &message_id,
                &pop_receipt,
                body,
                visibility_timeout,
                out,
            )
            .await
        }
        Commands::Count { queue } => execute_count_command(&store, &queue, out).await,
        Commands::Purge => execute_purge_command(&store, out).await,
        Commands::Config { .. } => Ok(()),
    }
}

// ============================================================================
// Setup
// ============================================================================

/// Install the stderr tracing subscriber
///
/// `RUST_LOG` wins over `--log-level` when set. Installing twice is a no-op.
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            EnvFilter::try_new(&cli.log_level).map_err(|e| CliError::invalid("log-level", e))?
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if cli.json_logs {
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

    if installed.is_err() {
        debug!("Tracing subscriber already installed");
    }
    Ok(())
}

/// Resolve configuration from the file, the environment and `--database`
pub fn load_configuration(cli: &Cli) -> Result<StoreConfig, CliError> {
    let mut config = StoreConfig::load(cli.config.as_deref())?;

    if let Some(path) = &cli.database {
        config.ledger = LedgerConfig::Sqlite { path: path.clone() };
        config.validate()?;
    }

    Ok(config)
}

async fn open_store(config: StoreConfig) -> Result<QueueStore, CliError> {
    let store = QueueStoreFactory::create_store(config).await?;

    // Each invocation is a separate process, so only a durable ledger keeps messages.
    if !store.ledger_kind().is_durable() {
        return Err(ConfigurationError::Missing {
            key: "ledger.path (or --database)".to_string(),
        }
        .into());
    }

    Ok(store)
}

fn parse_queue(queue: &str) -> Result<QueueName, CliError> {
    queue.parse().map_err(|e| CliError::invalid("queue", e))
}

fn parse_message_id(id: &str) -> Result<MessageId, CliError> {
    id.parse().map_err(|e| CliError::invalid("message-id", e))
}

fn parse_pop_receipt(receipt: &str) -> Result<PopReceipt, CliError> {
    receipt.parse().map_err(|e| CliError::invalid("pop-receipt", e))
}

fn seconds(arg: &str, value: u64) -> Result<Duration, CliError> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| CliError::invalid(arg, format!("{} seconds is out of range", value)))
}

/// Escape characters that would split a tab-separated record
fn escape_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\t' => escaped.push_str("\\t"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn read_body(body: &str) -> Result<Bytes, CliError> {
    if body != "-" {
        return Ok(Bytes::from(body.to_string()));
    }

    let mut buffer = Vec::new();
    std::io::stdin().read_to_end(&mut buffer)?;
    Ok(Bytes::from(buffer))
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn execute_put_command(
    store: &QueueStore,
    queue: &str,
    body: &str,
    visibility_timeout: u64,
    ttl: Option<u64>,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let queue = parse_queue(queue)?;
    let body = read_body(body)?;

    let mut options = store
        .default_put_options()
        .with_visibility_timeout(seconds("visibility-timeout", visibility_timeout)?);
    if let Some(ttl) = ttl {
        options = options.with_time_to_live(seconds("ttl", ttl)?);
    }

    let id = store.put(&queue, body, options).await?;
    info!(queue = %queue, message_id = %id, "Message put");

    writeln!(out, "{}", id)?;
    Ok(())
}

async fn execute_lease_command(
    store: &QueueStore,
    queue: &str,
    visibility_timeout: Option<u64>,
    max_messages: u32,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let queue = parse_queue(queue)?;

    let mut options: LeaseOptions = store.default_lease_options().with_max_messages(max_messages);
    if let Some(timeout) = visibility_timeout {
        options = options.with_visibility_timeout(seconds("visibility-timeout", timeout)?);
    }

    let leased = store.lease(&queue, options).await?;
    info!(queue = %queue, leased = leased.len(), "Lease completed");

    match format {
        OutputFormat::Text => {
            for message in &leased {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    message.message_id,
                    message.pop_receipt,
                    message.dequeue_count,
                    escape_field(&String::from_utf8_lossy(&message.body))
                )?;
            }
        }
        OutputFormat::Json => {
            let views: Vec<LeasedMessageView> = leased.iter().map(Into::into).collect();
            serde_json::to_writer_pretty(&mut *out, &views).map_err(std::io::Error::from)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

async fn execute_delete_command(
    store: &QueueStore,
    queue: &str,
    message_id: &str,
    pop_receipt: &str,
) -> Result<(), CliError> {
    let queue = parse_queue(queue)?;
    let id = parse_message_id(message_id)?;
    let receipt = parse_pop_receipt(pop_receipt)?;

    store.delete(&queue, &id, &receipt).await?;
    info!(queue = %queue, message_id = %id, "Message deleted");
    Ok(())
}

async fn execute_extend_command(
    store: &QueueStore,
    queue: &str,
    message_id: &str,
    pop_receipt: &str,
    body: Option<String>,
    visibility_timeout: u64,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let queue = parse_queue(queue)?;
    let id = parse_message_id(message_id)?;
    let receipt = parse_pop_receipt(pop_receipt)?;
    let new_body = body.as_deref().map(read_body).transpose()?;

    let renewal = store
        .extend_lease(
            &queue,
            &id,
            &receipt,
            new_body,
            seconds("visibility-timeout", visibility_timeout)?,
        )
        .await?;
    info!(queue = %queue, message_id = %id, "Lease extended");

    writeln!(out, "{}\t{}", renewal.pop_receipt, renewal.next_visible_at)?;
    Ok(())
}

async fn execute_count_command(
    store: &QueueStore,
    queue: &str,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let queue = parse_queue(queue)?;
    let count = store.count(&queue).await?;
    writeln!(out, "{}", count)?;
    Ok(())
}

async fn execute_purge_command(store: &QueueStore, out: &mut dyn Write) -> Result<(), CliError> {
    let removed = store.purge_expired().await?;
    info!(removed = removed, "Expired messages purged");
    writeln!(out, "{}", removed)?;
    Ok(())
}

fn execute_config_command(
    config: &StoreConfig,
    show: bool,
    format: &ConfigFormat,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    if !show {
        writeln!(out, "Configuration is valid")?;
        return Ok(());
    }

    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config).map_err(|e| {
            ConfigurationError::Parsing {
                message: e.to_string(),
            }
        })?,
        ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|e| {
            ConfigurationError::Parsing {
                message: e.to_string(),
            }
        })?,
    };

    writeln!(out, "{}", rendered.trim_end())?;
    Ok(())
}
