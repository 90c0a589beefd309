//! The synchronizable entity contract.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use offsync_common::{EntityId, Timestamp};

use crate::conflict;

/// An entity that can be replicated between the local store and the remote.
///
/// Every entity carries an `updated_at` stamped by whichever side mutated it
/// and an optional `deleted_at` tombstone.
pub trait SyncEntity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Identifier of this entity within its type.
    fn id(&self) -> &EntityId;

    /// Time of the last mutation.
    fn updated_at(&self) -> Timestamp;

    /// Tombstone time, if the entity is logically deleted.
    fn deleted_at(&self) -> Option<Timestamp>;

    /// Return a copy of this entity tombstoned at `deleted_at`.
    fn with_deleted_at(self, deleted_at: Timestamp) -> Self;

    /// `max(updated_at, deleted_at)`; the value conflict checks compare against.
    fn effective_timestamp(&self) -> Timestamp {
        conflict::effective_timestamp(self.updated_at(), self.deleted_at())
    }

    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

/// One entry of a "modified since" batch returned by the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned"))]
pub enum RemoteChange<T> {
    /// The remote holds a live version of the entity.
    Updated(T),
    /// The entity was deleted on the remote.
    Deleted {
        id: EntityId,
        deleted_at: Option<Timestamp>,
    },
}

impl<T: SyncEntity> RemoteChange<T> {
    pub fn id(&self) -> &EntityId {
        match self {
            RemoteChange::Updated(entity) => entity.id(),
            RemoteChange::Deleted { id, .. } => id,
        }
    }

    /// Watermark this change contributes to the pull cursor.
    ///
    /// A deletion without a tombstone time contributes nothing.
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            RemoteChange::Updated(entity) => Some(entity.effective_timestamp()),
            RemoteChange::Deleted { deleted_at, .. } => *deleted_at,
        }
    }
}
