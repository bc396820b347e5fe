//! Priority classification for enqueued operations.
//!
//! Pure and deterministic: called exactly once at enqueue time, and the
//! resulting tier never changes for the lifetime of the item.

use serde_json::Value;

use crate::types::{OperationType, Priority};

/// Map an operation to its priority tier.
///
/// Policy: operations with irreversible or user-visible consequences
/// (account mutations, final assessment submissions) are high; routine
/// content updates are medium; analytics-style writes are low. Unknown
/// custom operations default to medium so they are neither starved nor
/// allowed to jump ahead of account mutations.
pub fn classify(operation: &OperationType, payload: &Value) -> Priority {
    match operation {
        OperationType::AccountUpdate => Priority::High,
        // A completed assessment locks in scores the user can see; drafts
        // are routine saves.
        OperationType::AssessmentSubmit => {
            if payload.get("final").and_then(Value::as_bool).unwrap_or(false) {
                Priority::High
            } else {
                Priority::Medium
            }
        }
        OperationType::JournalEntry | OperationType::PreferenceChange => Priority::Medium,
        OperationType::AnalyticsEvent => Priority::Low,
        OperationType::Custom(_) => Priority::Medium,
    }
}
