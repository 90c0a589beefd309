//! Observable sync status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// Coarse status for a sync indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// The last drain emptied the queue.
    Synced,
    /// A drain is running or more work is queued.
    Syncing,
    /// The last drain halted on a transient failure.
    Offline,
    /// The last drain halted on a non-retryable failure or configuration error.
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Offline => "offline",
            SyncStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Snapshot published after every status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub status: SyncStatus,
    /// Queue length observed at the end of the last drain.
    pub pending_operations: usize,
    /// End of the last drain that emptied the queue.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Failure that halted the last drain.
    pub last_error: Option<String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            status: SyncStatus::Synced,
            pending_operations: 0,
            last_synced_at: None,
            last_error: None,
        }
    }
}

/// Owner of the status channel.
pub(crate) struct StatusTracker {
    tx: watch::Sender<SyncState>,
}

impl StatusTracker {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(SyncState::default());
        Self { tx }
    }

    pub(crate) fn current(&self) -> SyncState {
        self.tx.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.tx.subscribe()
    }

    pub(crate) fn begin(&self) {
        self.tx.send_modify(|state| state.status = SyncStatus::Syncing);
    }

    pub(crate) fn finished(&self, pending: usize) {
        self.tx.send_modify(|state| {
            state.pending_operations = pending;
            state.last_error = None;
            if pending == 0 {
                state.status = SyncStatus::Synced;
                state.last_synced_at = Some(Utc::now());
            } else {
                state.status = SyncStatus::Syncing;
            }
        });
    }

    pub(crate) fn halted(&self, reason: &str, retryable: bool, pending: usize) {
        self.tx.send_modify(|state| {
            state.status = if retryable {
                SyncStatus::Offline
            } else {
                SyncStatus::Error
            };
            state.pending_operations = pending;
            state.last_error = Some(reason.to_string());
        });
    }

    pub(crate) fn failed(&self, reason: &str) {
        self.tx.send_modify(|state| {
            state.status = SyncStatus::Error;
            state.last_error = Some(reason.to_string());
        });
    }
}
