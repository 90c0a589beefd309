//! Queued sync operations and handler outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use offsync_common::{EntityId, EntityType, Error, Timestamp};

/// Unique identifier of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a queued operation asks the remote to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Push the current local copy.
    Upsert,
    /// Propagate a local deletion.
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Upsert => write!(f, "upsert"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A pending mutation waiting to be pushed to the remote.
///
/// Immutable once created; removed from the queue only by the drain loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: OperationId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub kind: OperationKind,
    /// Position in the queue; strictly increasing across restarts.
    pub insertion_order: u64,
    /// When the operation was enqueued. Used as the tombstone time of deletes.
    pub created_at: Timestamp,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}/{}",
            self.insertion_order, self.kind, self.entity_type, self.entity_id
        )
    }
}

/// Outcome of executing one operation against the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOperationResult {
    /// The remote applied (or superseded) the operation.
    Success,
    /// The local entity no longer exists; the operation is stale.
    EntityNotFound,
    /// The remote call failed; the operation must stay queued.
    Failure { reason: String, retryable: bool },
}

impl SyncOperationResult {
    /// Build a failure from an error caught at the handler boundary.
    pub fn failure(err: &Error) -> Self {
        SyncOperationResult::Failure {
            reason: err.to_string(),
            retryable: err.is_retryable(),
        }
    }

    /// Whether the drain loop should remove the operation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncOperationResult::Success | SyncOperationResult::EntityNotFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_outcomes() {
        assert!(SyncOperationResult::Success.is_terminal());
        assert!(SyncOperationResult::EntityNotFound.is_terminal());
        assert!(!SyncOperationResult::failure(&Error::Network("down".into())).is_terminal());
    }

    #[test]
    fn test_failure_carries_retryability() {
        let offline = SyncOperationResult::failure(&Error::Network("down".into()));
        assert!(matches!(offline, SyncOperationResult::Failure { retryable: true, .. }));

        let broken = SyncOperationResult::failure(&Error::Storage("disk full".into()));
        assert!(matches!(broken, SyncOperationResult::Failure { retryable: false, .. }));
    }

    #[test]
    fn test_operation_display() {
        let op = SyncOperation {
            id: OperationId::generate(),
            entity_type: EntityType::new("note").unwrap(),
            entity_id: EntityId::new("n1"),
            kind: OperationKind::Delete,
            insertion_order: 3,
            created_at: Timestamp::from_millis(1),
        };
        assert_eq!(op.to_string(), "#3 delete note/n1");
    }
}
