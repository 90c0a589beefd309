//! Durable FIFO mutation queue.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use offsync_common::{EntityId, EntityType, Result, Timestamp};
use offsync_storage::json;

use crate::operation::{OperationId, OperationKind, SyncOperation};

/// FIFO of pending sync operations.
///
/// The queue never reorders or deduplicates. An operation leaves it only via
/// [`MutationQueue::remove`].
#[async_trait]
pub trait MutationQueue: Send + Sync {
    /// Append a new operation.
    ///
    /// # Postconditions
    /// - The operation is durable before this returns
    async fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        kind: OperationKind,
    ) -> Result<SyncOperation>;

    /// All operations not yet removed, in insertion order.
    async fn list_pending(&self) -> Result<Vec<SyncOperation>>;

    /// Remove one operation. Removing an absent operation is a no-op.
    async fn remove(&self, id: &OperationId) -> Result<()>;

    async fn len(&self) -> Result<usize> {
        Ok(self.list_pending().await?.len())
    }

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Persisted queue contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct QueueRegistry {
    /// Next insertion order to hand out; never reused.
    next_insertion_order: u64,
    /// Pending operations, kept sorted by insertion order.
    operations: Vec<SyncOperation>,
}

impl QueueRegistry {
    fn push(
        &mut self,
        entity_type: EntityType,
        entity_id: EntityId,
        kind: OperationKind,
    ) -> SyncOperation {
        let operation = SyncOperation {
            id: OperationId::generate(),
            entity_type,
            entity_id,
            kind,
            insertion_order: self.next_insertion_order,
            created_at: Timestamp::now(),
        };
        self.next_insertion_order += 1;
        self.operations.push(operation.clone());
        operation
    }

    fn without(&self, id: &OperationId) -> Option<Self> {
        let position = self.operations.iter().position(|op| &op.id == id)?;
        let mut next = self.clone();
        next.operations.remove(position);
        Some(next)
    }
}

/// Queue persisted to a JSON registry file.
///
/// The registry is rewritten atomically on every enqueue and remove, so a
/// crash never loses an acknowledged operation.
pub struct FileMutationQueue {
    registry_path: PathBuf,
    registry: Mutex<QueueRegistry>,
}

impl FileMutationQueue {
    /// Open the queue stored at `registry_path`.
    ///
    /// # Errors
    /// - I/O errors
    /// - Corrupt registry file
    pub async fn open(registry_path: impl AsRef<Path>) -> Result<Self> {
        let registry_path = registry_path.as_ref().to_path_buf();
        let mut registry: QueueRegistry = json::load_or_default(&registry_path).await?;
        registry.operations.sort_by_key(|op| op.insertion_order);

        debug!(
            "Opened mutation queue {} with {} pending operations",
            registry_path.display(),
            registry.operations.len()
        );

        Ok(Self {
            registry_path,
            registry: Mutex::new(registry),
        })
    }

    pub fn path(&self) -> &Path {
        &self.registry_path
    }
}

#[async_trait]
impl MutationQueue for FileMutationQueue {
    async fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        kind: OperationKind,
    ) -> Result<SyncOperation> {
        let mut registry = self.registry.lock().await;
        let mut next = registry.clone();
        let operation = next.push(entity_type, entity_id, kind);

        json::store_atomic(&self.registry_path, &next).await?;
        *registry = next;
        Ok(operation)
    }

    async fn list_pending(&self) -> Result<Vec<SyncOperation>> {
        Ok(self.registry.lock().await.operations.clone())
    }

    async fn remove(&self, id: &OperationId) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let Some(next) = registry.without(id) else {
            return Ok(());
        };

        json::store_atomic(&self.registry_path, &next).await?;
        *registry = next;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.registry.lock().await.operations.len())
    }
}

/// Non-durable queue for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryMutationQueue {
    registry: Mutex<QueueRegistry>,
}

impl MemoryMutationQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MutationQueue for MemoryMutationQueue {
    async fn enqueue(
        &self,
        entity_type: EntityType,
        entity_id: EntityId,
        kind: OperationKind,
    ) -> Result<SyncOperation> {
        Ok(self.registry.lock().await.push(entity_type, entity_id, kind))
    }

    async fn list_pending(&self) -> Result<Vec<SyncOperation>> {
        Ok(self.registry.lock().await.operations.clone())
    }

    async fn remove(&self, id: &OperationId) -> Result<()> {
        self.registry.lock().await.operations.retain(|op| &op.id != id);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.registry.lock().await.operations.len())
    }
}
