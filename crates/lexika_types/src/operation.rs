//! Pending mutations awaiting upload.

use crate::id::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    /// Record was created locally.
    Create,
    /// Record was updated locally.
    Update,
    /// Record was deleted locally.
    Delete,
}

/// Which record family a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    /// A vocabulary card.
    Card,
    /// A reference language.
    Language,
}

/// A local mutation queued for upload to the remote.
///
/// Operations are appended by the local store in mutation order and drained
/// FIFO by the sync orchestrator, which exclusively owns their lifecycle:
/// an operation is removed after a successful remote application, or
/// discarded once its retry count reaches the configured ceiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Store-assigned monotonic id.
    pub op_id: u64,
    /// What happened.
    pub kind: MutationKind,
    /// Which record family.
    pub entity: EntityKind,
    /// The record the mutation targets.
    pub entity_id: RecordId,
    /// Snapshot of the record at enqueue time (absent for deletes).
    pub payload: Option<serde_json::Value>,
    /// When the mutation was enqueued.
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed upload attempts so far.
    pub retry_count: u32,
    /// Diagnostic message from the most recent failure.
    pub last_error: Option<String>,
}

impl PendingOperation {
    /// Creates a fresh operation with no failures recorded.
    pub fn new(
        op_id: u64,
        kind: MutationKind,
        entity: EntityKind,
        entity_id: RecordId,
        payload: Option<serde_json::Value>,
    ) -> Self {
        Self {
            op_id,
            kind,
            entity,
            entity_id,
            payload,
            enqueued_at: Utc::now(),
            retry_count: 0,
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_operation_starts_clean() {
        let op = PendingOperation::new(
            7,
            MutationKind::Delete,
            EntityKind::Card,
            RecordId::new("srv-1"),
            None,
        );
        assert_eq!(op.op_id, 7);
        assert_eq!(op.retry_count, 0);
        assert!(op.last_error.is_none());
        assert!(op.payload.is_none());
    }
}
