//! Outbox CLI
//!
//! Thin wrapper around outbox-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Buffer an operation while offline
//! outbox enqueue journal_entry '{"text": "slept well"}' --key journal-2024-06-01
//!
//! # Show outstanding queue depth by tier
//! outbox stats
//!
//! # Drain the queue against a remote endpoint
//! outbox process --endpoint https://api.example.com/operations
//!
//! # Inspect and manage failed items
//! outbox failed
//! outbox retry <id>
//! outbox discard <id>
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use outbox_core::{
    ItemId, NetworkMonitor, OperationType, QueueItem, QueueStore, SubmitError, SyncQueue,
    Transport,
};

mod transport;
use transport::HttpTransport;

/// Outbox - offline mutation sync queue
#[derive(Parser)]
#[command(name = "outbox")]
#[command(version = "0.1.0")]
#[command(about = "Offline mutation sync queue")]
#[command(
    long_about = "Buffers state-changing operations durably while the network is unavailable and replays them against a remote endpoint in priority order."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: platform data dir + /outbox)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Buffer an operation for later submission
    Enqueue {
        /// Operation tag (e.g. journal_entry, account_update, analytics_event)
        operation: String,

        /// JSON payload (defaults to null)
        payload: Option<String>,

        /// Idempotency key; duplicate enqueues sharing a key merge while
        /// outstanding (defaults to a fresh unique key)
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Show outstanding queue depth by priority tier
    Stats,

    /// Drain the queue against a remote endpoint
    Process {
        /// Endpoint URL accepting operation submissions
        #[arg(short, long)]
        endpoint: String,
    },

    /// List failed items awaiting manual retry or discard
    Failed,

    /// Requeue a failed item for automatic processing
    Retry {
        /// Item id (as printed by `failed`)
        id: String,
    },

    /// Permanently drop a failed item
    Discard {
        /// Item id (as printed by `failed`)
        id: String,
    },
}

/// Placeholder transport for commands that never submit
struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn submit(&self, _item: &QueueItem) -> Result<(), SubmitError> {
        Err(SubmitError::Retryable("no endpoint configured".to_string()))
    }
}

fn resolve_data_dir(cli: &Cli) -> PathBuf {
    cli.data_dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("outbox")
    })
}

fn parse_item_id(raw: &str) -> Result<ItemId> {
    // `failed` prints ids in the display form item_<ulid>; accept both
    let bare = raw.strip_prefix("item_").unwrap_or(raw);
    ItemId::from_string(bare).map_err(|e| anyhow!("invalid item id {}: {}", raw, e))
}

fn print_failed_item(item: &QueueItem) {
    println!(
        "{}  {}  attempts={}  {}",
        item.id,
        item.operation_type,
        item.attempts,
        item.last_error.as_deref().unwrap_or("-"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let data_dir = resolve_data_dir(&cli);
    let store = QueueStore::new(data_dir.join("queue.redb"))
        .with_context(|| format!("opening queue store in {}", data_dir.display()))?;
    let network = NetworkMonitor::default();

    match cli.command {
        Commands::Enqueue {
            operation,
            payload,
            key,
        } => {
            let payload = match payload {
                Some(raw) => serde_json::from_str(&raw).context("payload is not valid JSON")?,
                None => serde_json::Value::Null,
            };
            let key = key.unwrap_or_else(|| ItemId::new().to_string_repr());
            let queue = SyncQueue::new(store, network, Arc::new(NullTransport));
            let id = queue.enqueue(OperationType::from_tag(&operation), payload, key)?;
            println!("{}", id);
        }

        Commands::Stats => {
            let queue = SyncQueue::new(store, network, Arc::new(NullTransport));
            let stats = queue.stats()?;
            println!("pending: {}", stats.total_pending);
            println!("  high:   {}", stats.high_priority);
            println!("  medium: {}", stats.medium_priority);
            println!("  low:    {}", stats.low_priority);
        }

        Commands::Process { endpoint } => {
            let queue = SyncQueue::new(store, network, Arc::new(HttpTransport::new(endpoint)));
            let results = queue.process().await?;
            if results.is_empty() {
                println!("Nothing to process");
            }
            for result in results {
                match result.error {
                    None => println!("{}  ok", result.id),
                    Some(err) => println!("{}  failed: {}", result.id, err),
                }
            }
        }

        Commands::Failed => {
            let queue = SyncQueue::new(store, network, Arc::new(NullTransport));
            let failed = queue.failed_items()?;
            if failed.is_empty() {
                println!("No failed items");
            }
            for item in failed {
                print_failed_item(&item);
            }
        }

        Commands::Retry { id } => {
            let id = parse_item_id(&id)?;
            let queue = SyncQueue::new(store, network, Arc::new(NullTransport));
            queue.retry(&id)?;
            println!("{} requeued", id);
        }

        Commands::Discard { id } => {
            let id = parse_item_id(&id)?;
            let queue = SyncQueue::new(store, network, Arc::new(NullTransport));
            queue.discard(&id)?;
            println!("{} discarded", id);
        }
    }

    Ok(())
}
