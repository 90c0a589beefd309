//! Offsync sync coordination
//!
//! This module keeps a local replica and a remote server of record converging:
//! - Durable FIFO queue of local mutations, drained one operation at a time
//! - Per-entity-type handlers bridging local storage and the remote API
//! - Cursor-based incremental pull with remote-authoritative overwrite
//! - Observable sync status for UI indicators
//! - Manual, on-demand and periodic scheduling

pub mod coordinator;
pub mod engine;
pub mod handler;
pub mod operation;
pub mod pull;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod state;

// Re-export main types
pub use coordinator::{DrainReport, SyncCoordinator};
pub use engine::{SyncConfig, SyncEngine};
pub use handler::{EntityHandler, StoreHandler, SyncHandler};
pub use operation::{OperationId, OperationKind, SyncOperation, SyncOperationResult};
pub use pull::{PullCoordinator, PullReport, PullSync};
pub use queue::{FileMutationQueue, MemoryMutationQueue, MutationQueue};
pub use registry::HandlerRegistry;
pub use scheduler::{SyncMode, SyncRequest, SyncScheduler, SyncSchedulerHandle, SyncSummary};
pub use state::{SyncState, SyncStatus};

#[cfg(test)]
pub(crate) mod test_support {
    use offsync_common::{EntityId, EntityType, Timestamp};
    use offsync_storage::{MemoryLocalStore, MemoryRemote, SyncEntity};
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    use crate::handler::StoreHandler;
    use crate::operation::{OperationId, OperationKind, SyncOperation};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Note {
        pub id: EntityId,
        pub title: String,
        pub updated_at: Timestamp,
        pub deleted_at: Option<Timestamp>,
    }

    impl Note {
        pub fn new(id: &str, title: &str, updated_at: i64) -> Self {
            Self {
                id: EntityId::new(id),
                title: title.to_string(),
                updated_at: Timestamp::from_millis(updated_at),
                deleted_at: None,
            }
        }
    }

    impl SyncEntity for Note {
        fn id(&self) -> &EntityId {
            &self.id
        }

        fn updated_at(&self) -> Timestamp {
            self.updated_at
        }

        fn deleted_at(&self) -> Option<Timestamp> {
            self.deleted_at
        }

        fn with_deleted_at(mut self, deleted_at: Timestamp) -> Self {
            self.deleted_at = Some(deleted_at);
            self
        }
    }

    pub fn note_type() -> EntityType {
        EntityType::new("note").unwrap()
    }

    pub fn note_handler(
        local: Arc<MemoryLocalStore<Note>>,
        remote: Arc<MemoryRemote<Note>>,
    ) -> StoreHandler<Note> {
        StoreHandler::new(note_type(), "Note", local, remote)
    }

    pub fn operation(id: &str, kind: OperationKind) -> SyncOperation {
        SyncOperation {
            id: OperationId::generate(),
            entity_type: note_type(),
            entity_id: EntityId::new(id),
            kind,
            insertion_order: 0,
            created_at: Timestamp::now(),
        }
    }
}
