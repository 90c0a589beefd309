//! In-memory port implementations for testing and ephemeral replicas.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use offsync_common::{EntityId, EntityType, Error, Result, Timestamp};

use crate::entity::{RemoteChange, SyncEntity};
use crate::provider::{CursorStore, LocalStore, RemoteApi};
use crate::records::RecordSet;

/// In-memory local store.
///
/// All data is held in memory and lost on drop.
pub struct MemoryLocalStore<T> {
    entities: RwLock<BTreeMap<EntityId, T>>,
}

impl<T: SyncEntity> MemoryLocalStore<T> {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

impl<T: SyncEntity> Default for MemoryLocalStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: SyncEntity> LocalStore<T> for MemoryLocalStore<T> {
    async fn read(&self, id: &EntityId) -> Result<Option<T>> {
        Ok(self.entities.read().await.get(id).cloned())
    }

    async fn read_all(&self) -> Result<Vec<T>> {
        Ok(self.entities.read().await.values().cloned().collect())
    }

    async fn write(&self, entity: T) -> Result<()> {
        self.entities
            .write()
            .await
            .insert(entity.id().clone(), entity);
        Ok(())
    }

    async fn write_many(&self, entities: Vec<T>) -> Result<()> {
        let mut guard = self.entities.write().await;
        for entity in entities {
            guard.insert(entity.id().clone(), entity);
        }
        Ok(())
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        self.entities.write().await.remove(id);
        Ok(())
    }
}

/// In-memory server of record.
///
/// Applies the last-write-wins policy on every write. The reachability switch
/// and per-id failures make it usable as a flaky remote in tests.
pub struct MemoryRemote<T> {
    records: RwLock<RecordSet<T>>,
    reachable: AtomicBool,
    failing: RwLock<HashSet<EntityId>>,
    upsert_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl<T: SyncEntity> MemoryRemote<T> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(RecordSet::new()),
            reachable: AtomicBool::new(true),
            failing: RwLock::new(HashSet::new()),
            upsert_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Store a record directly, bypassing conflict checks.
    pub async fn seed(&self, entity: T) {
        self.records.write().await.insert(entity);
    }

    /// Record a tombstone directly.
    pub async fn seed_delete(&self, id: &EntityId, deleted_at: Timestamp) {
        self.records.write().await.delete(id, deleted_at);
    }

    /// Get the stored record, tombstoned or not.
    pub async fn get(&self, id: &EntityId) -> Option<T> {
        self.records.read().await.get(id).cloned()
    }

    /// Toggle whether calls reach the remote at all.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make every upsert or delete of `id` fail with a server error.
    pub async fn fail_for(&self, id: EntityId) {
        self.failing.write().await.insert(id);
    }

    /// Undo [`MemoryRemote::fail_for`].
    pub async fn clear_failure(&self, id: &EntityId) {
        self.failing.write().await.remove(id);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    async fn check_available(&self, id: Option<&EntityId>) -> Result<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Error::Network("remote unreachable".to_string()));
        }
        if let Some(id) = id {
            if self.failing.read().await.contains(id) {
                return Err(Error::Remote(format!("server rejected request for {}", id)));
            }
        }
        Ok(())
    }
}

impl<T: SyncEntity> Default for MemoryRemote<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: SyncEntity> RemoteApi<T> for MemoryRemote<T> {
    async fn upsert(&self, entity: &T) -> Result<Option<T>> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available(Some(entity.id())).await?;

        let authoritative = self.records.write().await.upsert(entity.clone());
        if authoritative.is_some() {
            debug!("Remote kept newer version of {}", entity.id());
        }
        Ok(authoritative)
    }

    async fn delete(&self, id: &EntityId, deleted_at: Timestamp) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available(Some(id)).await?;

        if !self.records.write().await.delete(id, deleted_at) {
            debug!("Remote ignored stale delete of {}", id);
        }
        Ok(())
    }

    async fn fetch_modified_since(&self, since: Option<Timestamp>) -> Result<Vec<RemoteChange<T>>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available(None).await?;

        Ok(self.records.read().await.modified_since(since))
    }
}

/// In-memory cursor store.
#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<HashMap<EntityType, Timestamp>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, entity_type: &EntityType) -> Result<Option<Timestamp>> {
        Ok(self.cursors.read().await.get(entity_type).copied())
    }

    async fn set(&self, entity_type: &EntityType, cursor: Timestamp) -> Result<()> {
        self.cursors
            .write()
            .await
            .insert(entity_type.clone(), cursor);
        Ok(())
    }
}
