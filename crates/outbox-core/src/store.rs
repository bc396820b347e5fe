//! Durable queue persistence using redb.
//!
//! The store is the single source of truth for queue state: every
//! `stats()`/`process()` call rebuilds its view from here, and a successful
//! `put` survives an abrupt process restart. One `SyncQueue` instance per
//! store namespace is assumed; redb provides single-item atomicity, no
//! distributed locking is needed.

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::OutboxError;
use crate::types::{ItemId, ItemStatus, QueueItem, QueueStats};

const ITEMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("queue_items");

/// Which items a `get_all` scan should return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Every record in the store
    Any,
    /// Records in exactly this state
    Only(ItemStatus),
    /// Records in pending or processing state
    Outstanding,
}

impl StatusFilter {
    fn matches(&self, status: ItemStatus) -> bool {
        match self {
            StatusFilter::Any => true,
            StatusFilter::Only(s) => status == *s,
            StatusFilter::Outstanding => status.is_outstanding(),
        }
    }
}

/// Persistence layer for queue items, backed by redb
#[derive(Clone)]
pub struct QueueStore {
    db: Arc<RwLock<Database>>,
}

impl QueueStore {
    /// Open (or create) a store at the given path.
    ///
    /// Creates the parent directory and the items table if needed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, OutboxError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ITEMS_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Insert or overwrite a queue item.
    ///
    /// The write is committed before this returns; a crash immediately
    /// afterwards must not lose the record.
    pub fn put(&self, item: &QueueItem) -> Result<(), OutboxError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(ITEMS_TABLE)?;
            let data = serde_json::to_vec(item)
                .map_err(|e| OutboxError::Serialization(e.to_string()))?;
            let key = item.id.to_string_repr();
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Load a single item by id.
    ///
    /// Returns `None` if no item with the given id exists.
    pub fn get(&self, id: &ItemId) -> Result<Option<QueueItem>, OutboxError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(ITEMS_TABLE)?;
        let key = id.to_string_repr();

        match table.get(key.as_str())? {
            Some(v) => {
                let item: QueueItem = serde_json::from_slice(v.value())
                    .map_err(|e| OutboxError::Serialization(e.to_string()))?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    /// Load all items matching the filter.
    ///
    /// No ordering is guaranteed here; the queue sorts after loading.
    pub fn get_all(&self, filter: StatusFilter) -> Result<Vec<QueueItem>, OutboxError> {
        let db = self.db.read();
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(ITEMS_TABLE)?;

        let mut items = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let item: QueueItem = serde_json::from_slice(value.value())
                .map_err(|e| OutboxError::Serialization(e.to_string()))?;
            if filter.matches(item.status) {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Remove an item. Removing a nonexistent id is a no-op.
    pub fn delete(&self, id: &ItemId) -> Result<(), OutboxError> {
        let db = self.db.read();
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(ITEMS_TABLE)?;
            let key = id.to_string_repr();
            table.remove(key.as_str())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Find the outstanding (pending or processing) item with the given
    /// idempotency key, if any.
    ///
    /// The invariant "at most one outstanding item per key" is maintained by
    /// the enqueue path, so the first match is the only match.
    pub fn find_outstanding(&self, idempotency_key: &str) -> Result<Option<QueueItem>, OutboxError> {
        let items = self.get_all(StatusFilter::Outstanding)?;
        Ok(items
            .into_iter()
            .find(|i| i.idempotency_key == idempotency_key))
    }

    /// Count outstanding items, broken down by priority tier.
    ///
    /// Computed from the store on every call, never from a cached snapshot.
    pub fn counts(&self) -> Result<QueueStats, OutboxError> {
        let items = self.get_all(StatusFilter::Outstanding)?;

        let mut stats = QueueStats::default();
        for item in &items {
            stats.total_pending += 1;
            match item.priority {
                crate::types::Priority::High => stats.high_priority += 1,
                crate::types::Priority::Medium => stats.medium_priority += 1,
                crate::types::Priority::Low => stats.low_priority += 1,
            }
        }
        Ok(stats)
    }
}
