//! JSON-file-backed port implementations.
//!
//! Each store keeps its full state in memory and rewrites one JSON file
//! atomically on every mutation. The write lock is held across the rewrite so
//! concurrent writers cannot persist out of order.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use offsync_common::{EntityId, EntityType, Result, Timestamp};

use crate::entity::{RemoteChange, SyncEntity};
use crate::json;
use crate::provider::{CursorStore, LocalStore, RemoteApi};
use crate::records::RecordSet;

/// Local store persisted as a single JSON file.
pub struct FileLocalStore<T> {
    path: PathBuf,
    entities: Mutex<BTreeMap<EntityId, T>>,
}

impl<T: SyncEntity> FileLocalStore<T> {
    /// Open the store at `path`, loading existing contents.
    ///
    /// # Postconditions
    /// - A missing file opens as an empty store; it is created on first write
    ///
    /// # Errors
    /// - I/O errors
    /// - Corrupt store file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entities: BTreeMap<EntityId, T> = json::load_or_default(&path).await?;
        debug!("Opened local store {} with {} entities", path.display(), entities.len());

        Ok(Self {
            path,
            entities: Mutex::new(entities),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<T: SyncEntity> LocalStore<T> for FileLocalStore<T> {
    async fn read(&self, id: &EntityId) -> Result<Option<T>> {
        Ok(self.entities.lock().await.get(id).cloned())
    }

    async fn read_all(&self) -> Result<Vec<T>> {
        Ok(self.entities.lock().await.values().cloned().collect())
    }

    async fn write(&self, entity: T) -> Result<()> {
        self.write_many(vec![entity]).await
    }

    async fn write_many(&self, entities: Vec<T>) -> Result<()> {
        let mut guard = self.entities.lock().await;
        let mut next = guard.clone();
        for entity in entities {
            next.insert(entity.id().clone(), entity);
        }
        json::store_atomic(&self.path, &next).await?;
        *guard = next;
        Ok(())
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        let mut guard = self.entities.lock().await;
        if !guard.contains_key(id) {
            return Ok(());
        }
        let mut next = guard.clone();
        next.remove(id);
        json::store_atomic(&self.path, &next).await?;
        *guard = next;
        Ok(())
    }
}

/// Server of record persisted as a JSON file.
///
/// A filesystem stand-in for a real remote, sharing the last-write-wins rules
/// of [`RecordSet`]. Several replicas can point at the same file.
pub struct FileRemote<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _entity: std::marker::PhantomData<fn() -> T>,
}

impl<T: SyncEntity> FileRemote<T> {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
            _entity: std::marker::PhantomData,
        }
    }

    /// Snapshot of the stored records.
    pub async fn records(&self) -> Result<RecordSet<T>> {
        let _guard = self.lock.lock().await;
        json::load_or_default(&self.path).await
    }

    /// Reload, mutate and persist the record set under the lock.
    async fn update<R>(&self, apply: impl FnOnce(&mut RecordSet<T>) -> R + Send) -> Result<R> {
        let _guard = self.lock.lock().await;
        let mut records: RecordSet<T> = json::load_or_default(&self.path).await?;
        let result = apply(&mut records);
        json::store_atomic(&self.path, &records).await?;
        Ok(result)
    }
}

#[async_trait]
impl<T: SyncEntity> RemoteApi<T> for FileRemote<T> {
    async fn upsert(&self, entity: &T) -> Result<Option<T>> {
        let incoming = entity.clone();
        self.update(move |records| records.upsert(incoming)).await
    }

    async fn delete(&self, id: &EntityId, deleted_at: Timestamp) -> Result<()> {
        let accepted = self.update(|records| records.delete(id, deleted_at)).await?;
        if !accepted {
            debug!("Remote ignored stale delete of {}", id);
        }
        Ok(())
    }

    async fn fetch_modified_since(&self, since: Option<Timestamp>) -> Result<Vec<RemoteChange<T>>> {
        Ok(self.records().await?.modified_since(since))
    }
}

/// Cursor store persisted as a JSON map of entity type to timestamp.
pub struct FileCursorStore {
    path: PathBuf,
    cursors: Mutex<BTreeMap<String, Timestamp>>,
}

impl FileCursorStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cursors = json::load_or_default(&path).await?;
        Ok(Self {
            path,
            cursors: Mutex::new(cursors),
        })
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn get(&self, entity_type: &EntityType) -> Result<Option<Timestamp>> {
        Ok(self.cursors.lock().await.get(entity_type.as_str()).copied())
    }

    async fn set(&self, entity_type: &EntityType, cursor: Timestamp) -> Result<()> {
        let mut guard = self.cursors.lock().await;
        let mut next = guard.clone();
        next.insert(entity_type.to_string(), cursor);
        json::store_atomic(&self.path, &next).await?;
        *guard = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Note;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_persists_across_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.json");

        {
            let store: FileLocalStore<Note> = FileLocalStore::open(&path).await.unwrap();
            store.write(Note::new("a", "first", 1)).await.unwrap();
            store.write(Note::new("b", "second", 2)).await.unwrap();
            store.delete(&EntityId::new("b")).await.unwrap();
        }

        let store: FileLocalStore<Note> = FileLocalStore::open(&path).await.unwrap();
        let all = store.read_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "first");
    }

    #[tokio::test]
    async fn test_file_remote_applies_lww() {
        let temp = TempDir::new().unwrap();
        let remote: FileRemote<Note> = FileRemote::new(temp.path().join("remote.json"));

        assert!(remote.upsert(&Note::new("a", "v1", 20)).await.unwrap().is_none());
        let kept = remote.upsert(&Note::new("a", "stale", 10)).await.unwrap();
        assert_eq!(kept.unwrap().title, "v1");

        remote
            .delete(&EntityId::new("a"), Timestamp::from_millis(30))
            .await
            .unwrap();

        let changes = remote
            .fetch_modified_since(Some(Timestamp::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert!(matches!(changes[0], RemoteChange::Deleted { .. }));
    }

    #[tokio::test]
    async fn test_two_replicas_share_one_remote_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("remote.json");
        let first: FileRemote<Note> = FileRemote::new(&path);
        let second: FileRemote<Note> = FileRemote::new(&path);

        first.upsert(&Note::new("a", "from first", 5)).await.unwrap();
        let seen = second.fetch_modified_since(None).await.unwrap();
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_store_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cursors.json");
        let ty = EntityType::new("note").unwrap();

        {
            let cursors = FileCursorStore::open(&path).await.unwrap();
            cursors.set(&ty, Timestamp::from_millis(42)).await.unwrap();
        }

        let cursors = FileCursorStore::open(&path).await.unwrap();
        assert_eq!(cursors.get(&ty).await.unwrap(), Some(Timestamp::from_millis(42)));
    }
}
