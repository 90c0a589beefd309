//! Per-entity-type bridge between the local store and the remote API.
//!
//! [`EntityHandler`] is the typed template: an entity type supplies the four
//! primitive operations and gets [`SyncHandler::execute`] for free through the
//! blanket impl. [`SyncHandler`] is the object-safe face the coordinator and
//! registry work with.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use offsync_common::{EntityId, EntityType, Result, Timestamp};
use offsync_storage::{LocalStore, RemoteApi, SyncEntity};

use crate::operation::{OperationKind, SyncOperation, SyncOperationResult};

/// Typed primitives a handler needs for one entity type.
#[async_trait]
pub trait EntityHandler: Send + Sync {
    type Entity: SyncEntity;

    /// Registry key of the entity type.
    fn entity_type(&self) -> &EntityType;

    /// Human-readable name used in diagnostics.
    fn entity_name(&self) -> &str;

    async fn read_local(&self, id: &EntityId) -> Result<Option<Self::Entity>>;

    async fn write_local(&self, entity: Self::Entity) -> Result<()>;

    /// Push an entity; `Some` carries the remote's authoritative version.
    async fn save_remote(&self, entity: &Self::Entity) -> Result<Option<Self::Entity>>;

    async fn delete_remote(&self, id: &EntityId, deleted_at: Timestamp) -> Result<()>;
}

/// Applies one queued operation to the remote.
///
/// Never returns an error: local and network failures are folded into
/// [`SyncOperationResult::Failure`].
#[async_trait]
pub trait SyncHandler: Send + Sync {
    fn entity_type(&self) -> &EntityType;

    fn entity_name(&self) -> &str;

    async fn execute(&self, operation: &SyncOperation) -> SyncOperationResult;
}

#[async_trait]
impl<H> SyncHandler for H
where
    H: EntityHandler,
{
    fn entity_type(&self) -> &EntityType {
        EntityHandler::entity_type(self)
    }

    fn entity_name(&self) -> &str {
        EntityHandler::entity_name(self)
    }

    async fn execute(&self, operation: &SyncOperation) -> SyncOperationResult {
        match operation.kind {
            OperationKind::Upsert => upsert(self, &operation.entity_id).await,
            OperationKind::Delete => {
                match self
                    .delete_remote(&operation.entity_id, operation.created_at)
                    .await
                {
                    Ok(()) => SyncOperationResult::Success,
                    Err(e) => {
                        warn!(
                            "Failed to delete {} {} on remote: {}",
                            EntityHandler::entity_name(self),
                            operation.entity_id,
                            e
                        );
                        SyncOperationResult::failure(&e)
                    }
                }
            }
        }
    }
}

async fn upsert<H: EntityHandler + ?Sized>(handler: &H, id: &EntityId) -> SyncOperationResult {
    let name = handler.entity_name();

    let entity = match handler.read_local(id).await {
        Ok(Some(entity)) => entity,
        Ok(None) => {
            debug!("{} {} no longer exists locally, discarding upsert", name, id);
            return SyncOperationResult::EntityNotFound;
        }
        Err(e) => {
            warn!("Failed to read {} {} from local store: {}", name, id, e);
            return SyncOperationResult::failure(&e);
        }
    };

    let authoritative = match handler.save_remote(&entity).await {
        Ok(authoritative) => authoritative,
        Err(e) => {
            warn!("Failed to push {} {}: {}", name, id, e);
            return SyncOperationResult::failure(&e);
        }
    };

    if let Some(newer) = authoritative {
        debug!("Remote kept its own version of {} {}, adopting it", name, id);
        if let Err(e) = handler.write_local(newer).await {
            warn!("Failed to store remote version of {} {}: {}", name, id, e);
            return SyncOperationResult::failure(&e);
        }
    }

    SyncOperationResult::Success
}

/// Handler binding one local store and one remote API.
///
/// Concrete entity types differ only in these bindings and their names.
pub struct StoreHandler<T> {
    entity_type: EntityType,
    entity_name: String,
    local: Arc<dyn LocalStore<T>>,
    remote: Arc<dyn RemoteApi<T>>,
}

impl<T: SyncEntity> StoreHandler<T> {
    pub fn new(
        entity_type: EntityType,
        entity_name: impl Into<String>,
        local: Arc<dyn LocalStore<T>>,
        remote: Arc<dyn RemoteApi<T>>,
    ) -> Self {
        Self {
            entity_type,
            entity_name: entity_name.into(),
            local,
            remote,
        }
    }
}

#[async_trait]
impl<T: SyncEntity> EntityHandler for StoreHandler<T> {
    type Entity = T;

    fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    fn entity_name(&self) -> &str {
        &self.entity_name
    }

    async fn read_local(&self, id: &EntityId) -> Result<Option<T>> {
        self.local.read(id).await
    }

    async fn write_local(&self, entity: T) -> Result<()> {
        self.local.write(entity).await
    }

    async fn save_remote(&self, entity: &T) -> Result<Option<T>> {
        self.remote.upsert(entity).await
    }

    async fn delete_remote(&self, id: &EntityId, deleted_at: Timestamp) -> Result<()> {
        self.remote.delete(id, deleted_at).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{note_handler, operation, Note};
    use offsync_storage::{MemoryLocalStore, MemoryRemote};

    #[tokio::test]
    async fn test_upsert_pushes_local_copy() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let handler = note_handler(local.clone(), remote.clone());

        local.write(Note::new("a", "draft", 10)).await.unwrap();
        let result = handler.execute(&operation("a", OperationKind::Upsert)).await;

        assert_eq!(result, SyncOperationResult::Success);
        assert_eq!(remote.get(&EntityId::new("a")).await.unwrap().title, "draft");
    }

    #[tokio::test]
    async fn test_upsert_of_missing_entity_is_not_found() {
        let local: Arc<MemoryLocalStore<Note>> = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let handler = note_handler(local, remote.clone());

        let result = handler.execute(&operation("gone", OperationKind::Upsert)).await;

        assert_eq!(result, SyncOperationResult::EntityNotFound);
        assert_eq!(remote.upsert_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_upsert_adopts_remote_version() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let handler = note_handler(local.clone(), remote.clone());

        remote.seed(Note::new("a", "server", 20)).await;
        local.write(Note::new("a", "stale client", 15)).await.unwrap();

        let result = handler.execute(&operation("a", OperationKind::Upsert)).await;

        assert_eq!(result, SyncOperationResult::Success);
        let adopted = local.read(&EntityId::new("a")).await.unwrap().unwrap();
        assert_eq!(adopted.title, "server");
        assert_eq!(adopted.updated_at, Timestamp::from_millis(20));
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_local_untouched() {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let handler = note_handler(local.clone(), remote.clone());

        local.write(Note::new("a", "draft", 10)).await.unwrap();
        remote.set_reachable(false);

        let result = handler.execute(&operation("a", OperationKind::Upsert)).await;

        assert!(matches!(
            result,
            SyncOperationResult::Failure { retryable: true, .. }
        ));
        assert_eq!(
            local.read(&EntityId::new("a")).await.unwrap().unwrap().title,
            "draft"
        );
    }

    #[tokio::test]
    async fn test_delete_uses_enqueue_time_as_tombstone() {
        let local: Arc<MemoryLocalStore<Note>> = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let handler = note_handler(local, remote.clone());

        remote.seed(Note::new("a", "server", 10)).await;
        let op = operation("a", OperationKind::Delete);

        assert_eq!(handler.execute(&op).await, SyncOperationResult::Success);
        let stored = remote.get(&EntityId::new("a")).await.unwrap();
        assert_eq!(stored.deleted_at, Some(op.created_at));
    }

    #[tokio::test]
    async fn test_delete_failure_maps_to_failure() {
        let local: Arc<MemoryLocalStore<Note>> = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let handler = note_handler(local, remote.clone());

        remote.set_reachable(false);
        let result = handler.execute(&operation("a", OperationKind::Delete)).await;

        assert!(!result.is_terminal());
        assert_eq!(remote.delete_calls(), 1);
    }
}
