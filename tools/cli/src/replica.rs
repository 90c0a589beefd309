//! File-backed replica wiring for the CLI.

use anyhow::{Context, Result};
use std::sync::Arc;

use offsync_common::{EntityId, EntityType, Timestamp};
use offsync_storage::{
    CursorStore, FileCursorStore, FileLocalStore, FileRemote, LocalStore, SyncEntity,
};
use offsync_sync::{
    FileMutationQueue, HandlerRegistry, OperationKind, PullCoordinator, StoreHandler,
    SyncConfig, SyncCoordinator, SyncEngine, SyncOperation,
};

use crate::config::CliConfig;
use crate::entities::{note_type, task_type, Note, Task};

/// One local replica: stores, queue and cursors under the data directory,
/// talking to a file remote under the remote directory.
pub struct Replica {
    pub engine: SyncEngine,
    pub notes: Arc<FileLocalStore<Note>>,
    pub tasks: Arc<FileLocalStore<Task>>,
    pub cursors: Arc<FileCursorStore>,
}

impl Replica {
    /// Open every store under the configured directories.
    ///
    /// Background drains are disabled; commands drain explicitly before the
    /// process exits.
    pub async fn open(config: &CliConfig) -> Result<Self> {
        let data = &config.data_dir;
        let remote = &config.remote_dir;

        let notes = Arc::new(
            FileLocalStore::open(data.join("notes.json"))
                .await
                .context("Failed to open local note store")?,
        );
        let tasks = Arc::new(
            FileLocalStore::open(data.join("tasks.json"))
                .await
                .context("Failed to open local task store")?,
        );
        let cursors = Arc::new(
            FileCursorStore::open(data.join("cursors.json"))
                .await
                .context("Failed to open cursor store")?,
        );
        let queue = Arc::new(
            FileMutationQueue::open(data.join("queue.json"))
                .await
                .context("Failed to open mutation queue")?,
        );

        let note_remote: Arc<FileRemote<Note>> =
            Arc::new(FileRemote::new(remote.join("notes.json")));
        let task_remote: Arc<FileRemote<Task>> =
            Arc::new(FileRemote::new(remote.join("tasks.json")));

        let registry = HandlerRegistry::new()
            .with_handler(Arc::new(StoreHandler::new(
                note_type()?,
                "Note",
                notes.clone(),
                note_remote.clone(),
            )))?
            .with_handler(Arc::new(StoreHandler::new(
                task_type()?,
                "Task",
                tasks.clone(),
                task_remote.clone(),
            )))?;

        let coordinator = SyncCoordinator::new(queue, Arc::new(registry));
        let engine_config = SyncConfig {
            drain_on_enqueue: false,
            ..config.sync.clone()
        };
        let mut engine = SyncEngine::new(coordinator, engine_config);
        engine.add_puller(Arc::new(PullCoordinator::new(
            note_type()?,
            notes.clone(),
            note_remote,
            cursors.clone(),
        )))?;
        engine.add_puller(Arc::new(PullCoordinator::new(
            task_type()?,
            tasks.clone(),
            task_remote,
            cursors.clone(),
        )))?;

        Ok(Self {
            engine,
            notes,
            tasks,
            cursors,
        })
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        self.engine.coordinator()
    }

    pub async fn put_note(&self, note: Note) -> Result<SyncOperation> {
        let id = note.id.clone();
        self.notes.write(note).await.context("Failed to write note")?;
        self.enqueue(note_type()?, id, OperationKind::Upsert).await
    }

    pub async fn put_task(&self, task: Task) -> Result<SyncOperation> {
        let id = task.id.clone();
        self.tasks.write(task).await.context("Failed to write task")?;
        self.enqueue(task_type()?, id, OperationKind::Upsert).await
    }

    /// Live note by id. A tombstoned copy adopted from the remote reads as absent.
    pub async fn read_note(&self, id: &EntityId) -> Result<Option<Note>> {
        Ok(live(self.notes.read(id).await?))
    }

    pub async fn read_task(&self, id: &EntityId) -> Result<Option<Task>> {
        Ok(live(self.tasks.read(id).await?))
    }

    pub async fn list_notes(&self) -> Result<Vec<Note>> {
        Ok(live_all(self.notes.read_all().await?))
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>> {
        Ok(live_all(self.tasks.read_all().await?))
    }

    /// Delete locally, then queue the remote delete.
    pub async fn delete(&self, entity_type: EntityType, id: EntityId) -> Result<SyncOperation> {
        if entity_type == note_type()? {
            self.notes.delete(&id).await?;
        } else if entity_type == task_type()? {
            self.tasks.delete(&id).await?;
        } else {
            anyhow::bail!("Unknown entity type '{}'. Use: note or task", entity_type);
        }
        self.enqueue(entity_type, id, OperationKind::Delete).await
    }

    async fn enqueue(
        &self,
        entity_type: EntityType,
        id: EntityId,
        kind: OperationKind,
    ) -> Result<SyncOperation> {
        self.coordinator()
            .enqueue(entity_type, id, kind)
            .await
            .context("Failed to queue change")
    }

    pub async fn cursor(&self, entity_type: &EntityType) -> Result<Option<Timestamp>> {
        Ok(self.cursors.get(entity_type).await?)
    }
}

fn live<T: SyncEntity>(entity: Option<T>) -> Option<T> {
    entity.filter(|e| !e.is_deleted())
}

fn live_all<T: SyncEntity>(entities: Vec<T>) -> Vec<T> {
    entities.into_iter().filter(|e| !e.is_deleted()).collect()
}
