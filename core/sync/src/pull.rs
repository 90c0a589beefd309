//! Pull-side sync: apply remote changes to the local replica.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use offsync_common::{EntityType, Result, Timestamp};
use offsync_storage::{CursorStore, LocalStore, RemoteApi, RemoteChange, SyncEntity};

/// Outcome of one pull for one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    pub entity_type: EntityType,
    /// Entities overwritten locally with the remote copy.
    pub updated: usize,
    /// Entities removed locally.
    pub deleted: usize,
    pub cursor_before: Option<Timestamp>,
    pub cursor_after: Option<Timestamp>,
}

impl PullReport {
    pub fn applied(&self) -> usize {
        self.updated + self.deleted
    }
}

/// Object-safe pull entry point, one per entity type.
#[async_trait]
pub trait PullSync: Send + Sync {
    fn entity_type(&self) -> &EntityType;

    /// Fetch and apply everything modified since the stored cursor.
    ///
    /// # Postconditions
    /// - The cursor advances only if every change in the batch was applied
    /// - The cursor never moves backwards
    ///
    /// # Errors
    /// - Remote fetch errors; nothing is applied and the cursor is unchanged
    /// - Local store errors; earlier changes may already be applied, the
    ///   cursor is unchanged and the next pull re-applies them
    async fn pull(&self) -> Result<PullReport>;
}

/// Pull coordinator for one entity type.
///
/// Remote state is authoritative: changes overwrite the local replica
/// without a timestamp comparison.
pub struct PullCoordinator<T> {
    entity_type: EntityType,
    local: Arc<dyn LocalStore<T>>,
    remote: Arc<dyn RemoteApi<T>>,
    cursors: Arc<dyn CursorStore>,
    lock: Mutex<()>,
}

impl<T: SyncEntity> PullCoordinator<T> {
    pub fn new(
        entity_type: EntityType,
        local: Arc<dyn LocalStore<T>>,
        remote: Arc<dyn RemoteApi<T>>,
        cursors: Arc<dyn CursorStore>,
    ) -> Self {
        Self {
            entity_type,
            local,
            remote,
            cursors,
            lock: Mutex::new(()),
        }
    }

    /// Apply a batch in order, grouping consecutive updates into one write.
    async fn apply(&self, changes: Vec<RemoteChange<T>>, report: &mut PullReport) -> Result<()> {
        let mut writes: Vec<T> = Vec::new();

        for change in changes {
            match change {
                RemoteChange::Updated(entity) => writes.push(entity),
                RemoteChange::Deleted { id, .. } => {
                    self.flush(&mut writes, report).await?;
                    self.local.delete(&id).await?;
                    report.deleted += 1;
                }
            }
        }

        self.flush(&mut writes, report).await
    }

    async fn flush(&self, writes: &mut Vec<T>, report: &mut PullReport) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(writes);
        let count = batch.len();
        self.local.write_many(batch).await?;
        report.updated += count;
        Ok(())
    }
}

#[async_trait]
impl<T: SyncEntity> PullSync for PullCoordinator<T> {
    fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    async fn pull(&self) -> Result<PullReport> {
        let _guard = self.lock.lock().await;

        let cursor_before = self.cursors.get(&self.entity_type).await?;
        let changes = match self.remote.fetch_modified_since(cursor_before).await {
            Ok(changes) => changes,
            Err(e) => {
                warn!("Failed to fetch {} changes: {}", self.entity_type, e);
                return Err(e);
            }
        };

        let mut report = PullReport {
            entity_type: self.entity_type.clone(),
            updated: 0,
            deleted: 0,
            cursor_before,
            cursor_after: cursor_before,
        };

        if changes.is_empty() {
            debug!("No {} changes since {:?}", self.entity_type, cursor_before);
            return Ok(report);
        }

        let newest = changes.iter().filter_map(RemoteChange::timestamp).max();

        if let Err(e) = self.apply(changes, &mut report).await {
            warn!(
                "Pull of {} stopped after {} changes: {}",
                self.entity_type,
                report.applied(),
                e
            );
            return Err(e);
        }

        if let Some(newest) = newest {
            if cursor_before.map_or(true, |before| newest > before) {
                self.cursors.set(&self.entity_type, newest).await?;
                report.cursor_after = Some(newest);
            }
        }

        info!(
            "Pulled {}: {} updated, {} deleted",
            self.entity_type, report.updated, report.deleted
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{note_type, Note};
    use offsync_common::EntityId;
    use offsync_storage::{MemoryCursorStore, MemoryLocalStore, MemoryRemote};

    struct Fixture {
        puller: PullCoordinator<Note>,
        local: Arc<MemoryLocalStore<Note>>,
        remote: Arc<MemoryRemote<Note>>,
        cursors: Arc<MemoryCursorStore>,
    }

    fn fixture() -> Fixture {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemote::new());
        let cursors = Arc::new(MemoryCursorStore::new());
        let puller = PullCoordinator::new(
            note_type(),
            local.clone(),
            remote.clone(),
            cursors.clone(),
        );
        Fixture {
            puller,
            local,
            remote,
            cursors,
        }
    }

    #[tokio::test]
    async fn test_pull_applies_updates_and_deletes() {
        let f = fixture();
        f.local.write(Note::new("b", "local b", 1)).await.unwrap();
        f.remote.seed(Note::new("a", "remote a", 3)).await;
        f.remote
            .seed_delete(&EntityId::new("b"), Timestamp::from_millis(5))
            .await;

        let report = f.puller.pull().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.cursor_after, Some(Timestamp::from_millis(5)));
        assert!(f.local.read(&EntityId::new("b")).await.unwrap().is_none());
        assert_eq!(
            f.cursors.get(&note_type()).await.unwrap(),
            Some(Timestamp::from_millis(5))
        );
    }

    #[tokio::test]
    async fn test_pull_overwrites_newer_local_copy() {
        let f = fixture();
        f.local.write(Note::new("a", "local", 50)).await.unwrap();
        f.remote.seed(Note::new("a", "remote", 10)).await;

        f.puller.pull().await.unwrap();

        let stored = f.local.read(&EntityId::new("a")).await.unwrap().unwrap();
        assert_eq!(stored.title, "remote");
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_cursor() {
        let f = fixture();
        f.cursors
            .set(&note_type(), Timestamp::from_millis(7))
            .await
            .unwrap();
        f.remote.set_reachable(false);

        assert!(f.puller.pull().await.is_err());
        assert_eq!(
            f.cursors.get(&note_type()).await.unwrap(),
            Some(Timestamp::from_millis(7))
        );
    }

    #[tokio::test]
    async fn test_empty_pull_keeps_cursor() {
        let f = fixture();
        f.cursors
            .set(&note_type(), Timestamp::from_millis(9))
            .await
            .unwrap();

        let report = f.puller.pull().await.unwrap();

        assert_eq!(report.applied(), 0);
        assert_eq!(report.cursor_after, Some(Timestamp::from_millis(9)));
        assert_eq!(f.remote.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_second_pull_sees_only_newer_changes() {
        let f = fixture();
        f.remote.seed(Note::new("a", "v1", 3)).await;
        f.puller.pull().await.unwrap();

        f.remote.seed(Note::new("b", "v1", 8)).await;
        let report = f.puller.pull().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.cursor_before, Some(Timestamp::from_millis(3)));
        assert_eq!(report.cursor_after, Some(Timestamp::from_millis(8)));
    }

    /// Local store whose deletes fail while `failing` is set.
    struct FailingDeletes {
        inner: MemoryLocalStore<Note>,
        failing: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl LocalStore<Note> for FailingDeletes {
        async fn read(&self, id: &EntityId) -> Result<Option<Note>> {
            self.inner.read(id).await
        }

        async fn read_all(&self) -> Result<Vec<Note>> {
            self.inner.read_all().await
        }

        async fn write(&self, entity: Note) -> Result<()> {
            self.inner.write(entity).await
        }

        async fn write_many(&self, entities: Vec<Note>) -> Result<()> {
            self.inner.write_many(entities).await
        }

        async fn delete(&self, id: &EntityId) -> Result<()> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(offsync_common::Error::Storage("disk full".to_string()));
            }
            self.inner.delete(id).await
        }
    }

    #[tokio::test]
    async fn test_local_failure_mid_batch_keeps_cursor_and_retry_resumes() {
        let local = Arc::new(FailingDeletes {
            inner: MemoryLocalStore::new(),
            failing: std::sync::atomic::AtomicBool::new(true),
        });
        let remote = Arc::new(MemoryRemote::new());
        let cursors = Arc::new(MemoryCursorStore::new());
        let puller = PullCoordinator::new(
            note_type(),
            local.clone(),
            remote.clone(),
            cursors.clone(),
        );

        cursors
            .set(&note_type(), Timestamp::from_millis(2))
            .await
            .unwrap();
        local.write(Note::new("b", "local b", 1)).await.unwrap();
        remote.seed(Note::new("a", "remote a", 3)).await;
        remote
            .seed_delete(&EntityId::new("b"), Timestamp::from_millis(5))
            .await;
        remote.seed(Note::new("c", "remote c", 7)).await;

        assert!(puller.pull().await.is_err());
        assert_eq!(
            cursors.get(&note_type()).await.unwrap(),
            Some(Timestamp::from_millis(2))
        );
        assert!(local.read(&EntityId::new("b")).await.unwrap().is_some());
        assert!(local.read(&EntityId::new("c")).await.unwrap().is_none());

        local
            .failing
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let report = puller.pull().await.unwrap();

        assert_eq!(report.cursor_before, Some(Timestamp::from_millis(2)));
        assert_eq!(report.updated, 2);
        assert_eq!(report.deleted, 1);
        assert!(local.read(&EntityId::new("b")).await.unwrap().is_none());
        assert_eq!(
            local.read(&EntityId::new("c")).await.unwrap().unwrap().title,
            "remote c"
        );
        assert_eq!(
            cursors.get(&note_type()).await.unwrap(),
            Some(Timestamp::from_millis(7))
        );
    }
}
