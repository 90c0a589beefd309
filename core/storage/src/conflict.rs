//! Last-write-wins conflict policy.
//!
//! The server of record accepts a write only when the incoming timestamp is
//! strictly newer than the stored record's effective timestamp. Ties favor
//! the stored record.

use offsync_common::Timestamp;

use crate::entity::SyncEntity;

/// Outcome of applying the policy to an incoming write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteDecision<T> {
    /// The incoming version wins and should be stored.
    Accepted(T),
    /// The stored version wins; carries the authoritative copy.
    Rejected(T),
}

impl<T> WriteDecision<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, WriteDecision::Accepted(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            WriteDecision::Accepted(v) | WriteDecision::Rejected(v) => v,
        }
    }
}

/// `max(updated_at, deleted_at or zero)`.
pub fn effective_timestamp(updated_at: Timestamp, deleted_at: Option<Timestamp>) -> Timestamp {
    updated_at.max(deleted_at.unwrap_or(Timestamp::ZERO))
}

/// Whether a write stamped `incoming` beats a record whose effective
/// timestamp is `stored`. An absent record accepts everything.
pub fn accepts_write(stored: Option<Timestamp>, incoming: Timestamp) -> bool {
    match stored {
        Some(stored) => incoming > stored,
        None => true,
    }
}

/// Apply the policy to an upsert.
pub fn resolve_upsert<T: SyncEntity>(stored: Option<&T>, incoming: T) -> WriteDecision<T> {
    match stored {
        Some(current) if !accepts_write(Some(current.effective_timestamp()), incoming.updated_at()) => {
            WriteDecision::Rejected(current.clone())
        }
        _ => WriteDecision::Accepted(incoming),
    }
}

/// Apply the policy to a tombstone for an existing record.
pub fn resolve_delete<T: SyncEntity>(stored: &T, deleted_at: Timestamp) -> WriteDecision<T> {
    if accepts_write(Some(stored.effective_timestamp()), deleted_at) {
        WriteDecision::Accepted(stored.clone().with_deleted_at(deleted_at))
    } else {
        WriteDecision::Rejected(stored.clone())
    }
}
