//! The sync queue: enqueue, priority-ordered drain, retry/backoff.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncQueue                                                      │
//! │  ├── QueueStore: durable item state (single source of truth)    │
//! │  ├── NetworkMonitor: debounced connectivity, aborts a run early │
//! │  ├── Transport: remote endpoint, one submission at a time       │
//! │  └── in_flight: AtomicBool coalescing concurrent process() calls│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One logical worker: `process()` drains sequentially, awaiting each
//! submission before advancing, which is what preserves strict priority
//! ordering. A second concurrent `process()` observes the in-flight flag
//! and returns an empty result instead of racing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::error::{OutboxError, OutboxResult, SubmitError};
use crate::network::NetworkMonitor;
use crate::store::{QueueStore, StatusFilter};
use crate::types::{now_ms, ItemId, ItemResult, ItemStatus, OperationType, QueueItem, QueueStats};

/// Remote endpoint contract: accepts one operation submission at a time and
/// returns success or a classified failure.
///
/// The queue assumes no ordering guarantees from the remote side beyond what
/// it enforces itself by sequential submission.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, item: &QueueItem) -> Result<(), SubmitError>;
}

/// Exponential backoff schedule with proportional jitter.
///
/// Delay before attempt `n + 1` is `base * multiplier^(n-1)`, capped, with
/// a uniform jitter of `±jitter` applied as a fraction of the delay.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub multiplier: f64,
    /// Jitter fraction in `[0, 1)`; 0 disables jitter
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Delay to impose after `attempts` failed attempts
    pub fn delay_for(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exp = self.multiplier.powi(attempts.saturating_sub(1) as i32);
        let mut millis = (self.base.as_millis() as f64 * exp).min(self.cap.as_millis() as f64);
        if self.jitter > 0.0 {
            let factor: f64 = rand::rng().random_range(-self.jitter..=self.jitter);
            millis *= 1.0 + factor;
        }
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// Queue tuning knobs
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Retryable failures beyond this attempt count become terminal
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Clears the in-flight flag when a processing run exits by any path
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Offline mutation sync queue.
///
/// Buffers operations durably while the network is unavailable and replays
/// them in priority order once connectivity returns. Construct one instance
/// per storage namespace; dependencies are injected so tests can run fully
/// isolated instances.
#[derive(Clone)]
pub struct SyncQueue {
    store: QueueStore,
    network: NetworkMonitor,
    transport: Arc<dyn Transport>,
    config: QueueConfig,
    in_flight: Arc<AtomicBool>,
}

impl SyncQueue {
    pub fn new(store: QueueStore, network: NetworkMonitor, transport: Arc<dyn Transport>) -> Self {
        Self::with_config(store, network, transport, QueueConfig::default())
    }

    pub fn with_config(
        store: QueueStore,
        network: NetworkMonitor,
        transport: Arc<dyn Transport>,
        config: QueueConfig,
    ) -> Self {
        Self {
            store,
            network,
            transport,
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The network monitor this queue observes
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Buffer an operation for remote submission. Never touches the network.
    ///
    /// Priority is classified once here and is immutable afterwards. If an
    /// item with the same idempotency key is still outstanding, the new
    /// payload replaces the old one on that item (attempts and backoff state
    /// preserved) instead of appending a duplicate.
    pub fn enqueue(
        &self,
        operation_type: OperationType,
        payload: serde_json::Value,
        idempotency_key: impl Into<String>,
    ) -> OutboxResult<ItemId> {
        let key = idempotency_key.into();

        if let Some(mut existing) = self.store.find_outstanding(&key)? {
            if existing.operation_type != operation_type {
                return Err(OutboxError::InvalidOperation(format!(
                    "idempotency key {} is outstanding with operation {}, refusing merge with {}",
                    key, existing.operation_type, operation_type
                )));
            }
            debug!(id = %existing.id, %key, "merging duplicate enqueue into outstanding item");
            existing.payload = payload;
            self.store.put(&existing)?;
            return Ok(existing.id);
        }

        let priority = classify(&operation_type, &payload);
        let item = QueueItem::new(operation_type, payload, key, priority);
        debug!(id = %item.id, %priority, op = %item.operation_type, "enqueued");
        self.store.put(&item)?;
        Ok(item.id.clone())
    }

    /// Outstanding queue depth by tier, recomputed from the store
    pub fn stats(&self) -> OutboxResult<QueueStats> {
        self.store.counts()
    }

    /// True while a processing run is in flight
    pub fn is_processing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Items awaiting manual retry or discard
    pub fn failed_items(&self) -> OutboxResult<Vec<QueueItem>> {
        self.store.get_all(StatusFilter::Only(ItemStatus::Failed))
    }

    /// Requeue a failed item for automatic processing, resetting its
    /// attempt count and error
    pub fn retry(&self, id: &ItemId) -> OutboxResult<()> {
        let mut item = self
            .store
            .get(id)?
            .ok_or_else(|| OutboxError::ItemNotFound(id.to_string()))?;
        if item.status != ItemStatus::Failed {
            return Err(OutboxError::InvalidOperation(format!(
                "cannot retry {} in {} state",
                id, item.status
            )));
        }
        item.status = ItemStatus::Pending;
        item.attempts = 0;
        item.last_error = None;
        item.last_attempt_at = None;
        info!(%id, "failed item requeued");
        self.store.put(&item)
    }

    /// Permanently drop a failed item
    pub fn discard(&self, id: &ItemId) -> OutboxResult<()> {
        let item = self
            .store
            .get(id)?
            .ok_or_else(|| OutboxError::ItemNotFound(id.to_string()))?;
        if item.status != ItemStatus::Failed {
            return Err(OutboxError::InvalidOperation(format!(
                "cannot discard {} in {} state",
                id, item.status
            )));
        }
        info!(%id, "failed item discarded");
        self.store.delete(id)
    }

    /// Drain pending items in priority order, submitting each sequentially.
    ///
    /// Single-flight: if a run is already in flight this returns immediately
    /// with an empty list. Items under backoff are skipped until their delay
    /// elapses. Each item's outcome is independent; one failure never aborts
    /// the run for subsequent items. Loss of connectivity mid-run stops the
    /// run gracefully, leaving the remaining items pending.
    pub async fn process(&self) -> OutboxResult<Vec<ItemResult>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("processing run already in flight, coalescing");
            return Ok(Vec::new());
        }
        let _guard = RunGuard {
            flag: self.in_flight.clone(),
        };

        // Items left in processing by an interrupted run (crash or storage
        // error mid-submission) re-enter the at-least-once lifecycle here.
        // Under the single-flight guard no submission can actually be in
        // flight, so any processing record is stale.
        for mut stale in self
            .store
            .get_all(StatusFilter::Only(ItemStatus::Processing))?
        {
            warn!(id = %stale.id, attempts = stale.attempts, "recovering item stranded in processing");
            stale.status = ItemStatus::Pending;
            self.store.put(&stale)?;
        }

        if !self.network.is_online() {
            debug!("offline, skipping processing run");
            return Ok(Vec::new());
        }

        let now = now_ms();
        let mut batch: Vec<QueueItem> = self
            .store
            .get_all(StatusFilter::Only(ItemStatus::Pending))?
            .into_iter()
            .filter(|item| self.is_due(item, now))
            .collect();
        // Strict priority ordering, FIFO within a tier. The order is fixed
        // at the start of the run; items enqueued mid-run wait for the next.
        batch.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let total = batch.len();
        info!(items = total, "processing run started");
        let mut results = Vec::with_capacity(total);

        for mut item in batch {
            // Abort the remainder (not the in-flight submission) on offline
            if !self.network.is_online() {
                info!(
                    remaining = total - results.len(),
                    "went offline mid-run, leaving remaining items pending"
                );
                break;
            }

            item.status = ItemStatus::Processing;
            item.attempts += 1;
            item.last_attempt_at = Some(now_ms());
            self.store.put(&item)?;

            match self.transport.submit(&item).await {
                Ok(()) => {
                    debug!(id = %item.id, "submission succeeded");
                    // An enqueue may have merged a replacement payload into
                    // the record while this submission was in flight; that
                    // payload has not been submitted, so the record stays
                    // pending instead of being deleted.
                    match self.store.get(&item.id)? {
                        Some(mut stored) if stored.payload != item.payload => {
                            debug!(id = %item.id, "payload replaced mid-submission, keeping pending");
                            stored.status = ItemStatus::Pending;
                            self.store.put(&stored)?;
                        }
                        _ => self.store.delete(&item.id)?,
                    }
                    results.push(ItemResult {
                        id: item.id,
                        success: true,
                        error: None,
                    });
                }
                Err(err) => {
                    let terminal = !err.is_retryable() || item.attempts >= self.config.max_attempts;
                    // Re-read before writing: the stored record may carry a
                    // payload merged mid-submission that a stale overwrite
                    // would drop.
                    let mut stored = match self.store.get(&item.id)? {
                        Some(stored) => stored,
                        None => item.clone(),
                    };
                    stored.status = if terminal {
                        ItemStatus::Failed
                    } else {
                        ItemStatus::Pending
                    };
                    stored.attempts = item.attempts;
                    stored.last_attempt_at = item.last_attempt_at;
                    stored.last_error = Some(err.to_string());
                    warn!(
                        id = %item.id,
                        attempts = item.attempts,
                        terminal,
                        error = %err,
                        "submission failed"
                    );
                    self.store.put(&stored)?;
                    results.push(ItemResult {
                        id: item.id,
                        success: false,
                        error: Some(err.to_string()),
                    });
                }
            }
        }

        info!(results = results.len(), "processing run finished");
        Ok(results)
    }

    /// Whether an item's backoff delay has elapsed by `now`
    fn is_due(&self, item: &QueueItem, now: i64) -> bool {
        match item.last_attempt_at {
            None => true,
            Some(last) => {
                let delay = self.config.backoff.delay_for(item.attempts);
                now - last >= delay.as_millis() as i64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_respects_cap() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.0,
        };
        assert_eq!(policy.delay_for(20), Duration::from_secs(300));
    }

    #[test]
    fn test_backoff_jitter_stays_in_band() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(2),
            cap: Duration::from_secs(300),
            multiplier: 2.0,
            jitter: 0.25,
        };
        for _ in 0..100 {
            let d = policy.delay_for(2).as_millis() as f64;
            assert!((3000.0..=5000.0).contains(&d), "delay {} out of band", d);
        }
    }
}
