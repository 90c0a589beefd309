//! Port traits consumed by the sync coordinators.

use async_trait::async_trait;

use offsync_common::{EntityId, EntityType, Result, Timestamp};

use crate::entity::{RemoteChange, SyncEntity};

/// Local persistent store for one entity type.
///
/// Reads must observe the latest completed write.
#[async_trait]
pub trait LocalStore<T: SyncEntity>: Send + Sync {
    /// Read a single entity.
    ///
    /// # Returns
    /// `None` if no entity with this id is stored.
    async fn read(&self, id: &EntityId) -> Result<Option<T>>;

    /// Read every stored entity.
    async fn read_all(&self) -> Result<Vec<T>>;

    /// Insert or overwrite an entity.
    async fn write(&self, entity: T) -> Result<()>;

    /// Insert or overwrite several entities in one step.
    async fn write_many(&self, entities: Vec<T>) -> Result<()>;

    /// Remove an entity. Removing an absent entity is not an error.
    async fn delete(&self, id: &EntityId) -> Result<()>;
}

/// Remote API client for one entity type.
///
/// All calls are idempotent from the caller's perspective.
#[async_trait]
pub trait RemoteApi<T: SyncEntity>: Send + Sync {
    /// Save an entity on the remote.
    ///
    /// # Returns
    /// - `None` if the remote accepted the write
    /// - `Some(authoritative)` if the remote kept a different version that
    ///   the caller should adopt
    ///
    /// # Errors
    /// - `Network` when the remote is unreachable
    /// - `Remote` when the server fails the request
    async fn upsert(&self, entity: &T) -> Result<Option<T>>;

    /// Delete an entity on the remote as of `deleted_at`.
    async fn delete(&self, id: &EntityId, deleted_at: Timestamp) -> Result<()>;

    /// Everything modified strictly after `since`; `None` means a full sync.
    async fn fetch_modified_since(&self, since: Option<Timestamp>) -> Result<Vec<RemoteChange<T>>>;
}

/// Persisted "last successfully pulled" watermark per entity type.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get(&self, entity_type: &EntityType) -> Result<Option<Timestamp>>;

    async fn set(&self, entity_type: &EntityType, cursor: Timestamp) -> Result<()>;
}
