//! Outbox Core Library
//!
//! Offline mutation sync queue: buffers state-changing operations performed
//! while the network is unavailable, persists them durably, and replays them
//! against a remote endpoint once connectivity returns, honoring priority
//! and idempotency.
//!
//! ## Overview
//!
//! - **Local-first**: `enqueue` never blocks on the network; items live in
//!   a redb store that survives process restarts
//! - **At-least-once**: items are retained until confirmed, permanently
//!   rejected, or discarded by the user; retryable failures back off
//!   exponentially up to an attempt ceiling
//! - **Priority-ordered**: high/medium/low tiers drained strictly in order,
//!   FIFO within a tier
//!
//! ## Quick Start
//!
//! ```ignore
//! use outbox_core::{NetworkMonitor, OperationType, QueueStore, SyncQueue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = QueueStore::new("~/.outbox/queue.redb")?;
//!     let network = NetworkMonitor::default();
//!     let queue = SyncQueue::new(store, network, transport);
//!
//!     // Buffer a mutation; returns immediately even when offline
//!     queue.enqueue(
//!         OperationType::JournalEntry,
//!         serde_json::json!({"text": "slept well"}),
//!         "journal-2024-06-01",
//!     )?;
//!
//!     // Replay everything once connectivity is back
//!     for result in queue.process().await? {
//!         println!("{}: {}", result.id, if result.success { "ok" } else { "failed" });
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod error;
pub mod network;
pub mod queue;
pub mod store;
pub mod types;

// Re-exports
pub use classify::classify;
pub use error::{OutboxError, OutboxResult, SubmitError};
pub use network::{Debouncer, NetworkConfig, NetworkMonitor, SubscriptionId};
pub use queue::{BackoffPolicy, QueueConfig, SyncQueue, Transport};
pub use store::{QueueStore, StatusFilter};
pub use types::{ItemId, ItemResult, ItemStatus, OperationType, Priority, QueueItem, QueueStats};
