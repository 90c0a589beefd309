//! Entity types the CLI replica syncs.

use serde::{Deserialize, Serialize};

use offsync_common::{EntityId, EntityType, Timestamp};
use offsync_storage::SyncEntity;

pub const NOTE: &str = "note";
pub const TASK: &str = "task";

pub fn note_type() -> anyhow::Result<EntityType> {
    Ok(EntityType::new(NOTE)?)
}

pub fn task_type() -> anyhow::Result<EntityType> {
    Ok(EntityType::new(TASK)?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub done: bool,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
}

macro_rules! impl_sync_entity {
    ($ty:ty) => {
        impl SyncEntity for $ty {
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
    };
}

impl_sync_entity!(Note);
impl_sync_entity!(Task);
