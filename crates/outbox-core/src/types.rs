//! Core types for the outbox queue

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Current wall-clock time as unix milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Unique identifier for a queue item
///
/// Uses ULID for time-ordered unique identifiers that sort lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemId(pub Ulid);

impl ItemId {
    /// Create a new ItemId with current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Convert to the canonical string representation (used as the store key)
    pub fn to_string_repr(&self) -> String {
        self.0.to_string()
    }

    /// Parse from string representation
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        let ulid = Ulid::from_string(s)?;
        Ok(Self(ulid))
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item_{}", self.0)
    }
}

/// Priority tier of a queued operation, fixed at enqueue time.
///
/// Variants are declared highest-first so the derived `Ord` sorts `High`
/// before `Medium` before `Low` in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

/// Lifecycle state of a queue item.
///
/// Successful items are deleted from the store rather than kept in a
/// terminal state, so there is no `done` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Waiting for the next processing run (possibly under backoff)
    Pending,
    /// Currently being submitted to the remote endpoint
    Processing,
    /// Attempts exhausted or permanently rejected; awaits manual retry/discard
    Failed,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Processing => write!(f, "processing"),
            ItemStatus::Failed => write!(f, "failed"),
        }
    }
}

impl ItemStatus {
    /// Pending and processing items count toward stats and idempotency merging
    pub fn is_outstanding(&self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Processing)
    }
}

/// The remote mutation family a queue item represents.
///
/// Known variants serialize as snake_case tags; anything else round-trips
/// through `Custom` so records written by a newer client version still load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    AccountUpdate,
    AssessmentSubmit,
    JournalEntry,
    PreferenceChange,
    AnalyticsEvent,
    #[serde(untagged)]
    Custom(String),
}

impl OperationType {
    /// Parse from the snake_case wire tag; unknown tags become `Custom`
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "account_update" => OperationType::AccountUpdate,
            "assessment_submit" => OperationType::AssessmentSubmit,
            "journal_entry" => OperationType::JournalEntry,
            "preference_change" => OperationType::PreferenceChange,
            "analytics_event" => OperationType::AnalyticsEvent,
            other => OperationType::Custom(other.to_string()),
        }
    }

    /// The snake_case wire tag for this operation
    pub fn as_tag(&self) -> &str {
        match self {
            OperationType::AccountUpdate => "account_update",
            OperationType::AssessmentSubmit => "assessment_submit",
            OperationType::JournalEntry => "journal_entry",
            OperationType::PreferenceChange => "preference_change",
            OperationType::AnalyticsEvent => "analytics_event",
            OperationType::Custom(tag) => tag,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_tag())
    }
}

/// One buffered operation awaiting remote submission.
///
/// This is also the persisted record schema. Unknown fields written by a
/// newer version are captured in `extra` and survive a read-modify-write
/// cycle; optional fields default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Unique identifier, generated at enqueue time
    pub id: ItemId,
    /// Caller-supplied key identifying the logical operation; duplicate
    /// enqueues sharing a key are merged while one is outstanding
    pub idempotency_key: String,
    /// What remote action this item represents
    pub operation_type: OperationType,
    /// Opaque data needed to perform the operation
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Priority tier, assigned once at creation and immutable thereafter
    pub priority: Priority,
    /// Current lifecycle state
    pub status: ItemStatus,
    /// Number of submission attempts so far
    pub attempts: u32,
    /// Last recorded failure reason, cleared on success
    #[serde(default)]
    pub last_error: Option<String>,
    /// Unix milliseconds of creation (FIFO tie-break within a tier)
    pub created_at: i64,
    /// Unix milliseconds of the last submission attempt, drives backoff
    #[serde(default)]
    pub last_attempt_at: Option<i64>,
    /// Fields written by a newer schema version, preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl QueueItem {
    /// Create a fresh pending item
    pub fn new(
        operation_type: OperationType,
        payload: serde_json::Value,
        idempotency_key: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: ItemId::new(),
            idempotency_key: idempotency_key.into(),
            operation_type,
            payload,
            priority,
            status: ItemStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now_ms(),
            last_attempt_at: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// Snapshot of outstanding queue depth, broken down by tier.
///
/// All four fields are always present; `total_pending` equals the sum of
/// the three tier counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Items in pending or processing state
    pub total_pending: usize,
    pub high_priority: usize,
    pub medium_priority: usize,
    pub low_priority: usize,
}

/// Per-item outcome of one processing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub id: ItemId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
