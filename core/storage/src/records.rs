//! Authoritative record set held by the server of record.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use offsync_common::{EntityId, Timestamp};

use crate::conflict::{self, WriteDecision};
use crate::entity::{RemoteChange, SyncEntity};

/// Records and tombstones as the remote stores them.
///
/// Every write goes through the last-write-wins policy in [`crate::conflict`].
/// Deletes of ids the set has never seen are kept as bare tombstones so they
/// are still reported to pulling clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Serialize", deserialize = "T: DeserializeOwned"))]
pub struct RecordSet<T> {
    records: BTreeMap<EntityId, T>,
    #[serde(default)]
    tombstones: BTreeMap<EntityId, Timestamp>,
}

impl<T> Default for RecordSet<T> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            tombstones: BTreeMap::new(),
        }
    }
}

impl<T: SyncEntity> RecordSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the stored record, tombstoned or not.
    pub fn get(&self, id: &EntityId) -> Option<&T> {
        self.records.get(id)
    }

    /// Effective timestamp of whatever is stored under `id`.
    pub fn effective_timestamp(&self, id: &EntityId) -> Option<Timestamp> {
        match self.records.get(id) {
            Some(record) => Some(record.effective_timestamp()),
            None => self.tombstones.get(id).copied(),
        }
    }

    /// Store a record without any conflict check.
    pub fn insert(&mut self, entity: T) {
        self.tombstones.remove(entity.id());
        self.records.insert(entity.id().clone(), entity);
    }

    /// Apply an upsert.
    ///
    /// # Returns
    /// - `None` if the write was accepted
    /// - `Some(stored)` if it was rejected, carrying the authoritative copy
    pub fn upsert(&mut self, incoming: T) -> Option<T> {
        if let Some(tombstone) = self.tombstones.get(incoming.id()).copied() {
            if !conflict::accepts_write(Some(tombstone), incoming.updated_at()) {
                // Synthesized for the caller; the bare tombstone stays as stored.
                return Some(incoming.with_deleted_at(tombstone));
            }
        }

        match conflict::resolve_upsert(self.records.get(incoming.id()), incoming) {
            WriteDecision::Accepted(entity) => {
                self.insert(entity);
                None
            }
            WriteDecision::Rejected(stored) => Some(stored),
        }
    }

    /// Apply a delete; returns whether the tombstone was recorded.
    pub fn delete(&mut self, id: &EntityId, deleted_at: Timestamp) -> bool {
        if let Some(stored) = self.records.get(id) {
            return match conflict::resolve_delete(stored, deleted_at) {
                WriteDecision::Accepted(tombstoned) => {
                    self.records.insert(id.clone(), tombstoned);
                    true
                }
                WriteDecision::Rejected(_) => false,
            };
        }

        let current = self.tombstones.get(id).copied();
        if conflict::accepts_write(current, deleted_at) {
            self.tombstones.insert(id.clone(), deleted_at);
            true
        } else {
            false
        }
    }

    /// Changes with an effective timestamp strictly after `since`, oldest first.
    pub fn modified_since(&self, since: Option<Timestamp>) -> Vec<RemoteChange<T>> {
        let is_newer = |ts: Timestamp| since.map_or(true, |cursor| ts > cursor);

        let mut changes: Vec<(Timestamp, RemoteChange<T>)> = self
            .records
            .values()
            .filter(|record| is_newer(record.effective_timestamp()))
            .map(|record| {
                let change = match record.deleted_at() {
                    Some(deleted_at) => RemoteChange::Deleted {
                        id: record.id().clone(),
                        deleted_at: Some(deleted_at),
                    },
                    None => RemoteChange::Updated(record.clone()),
                };
                (record.effective_timestamp(), change)
            })
            .collect();

        changes.extend(
            self.tombstones
                .iter()
                .filter(|(_, ts)| is_newer(**ts))
                .map(|(id, ts)| {
                    (
                        *ts,
                        RemoteChange::Deleted {
                            id: id.clone(),
                            deleted_at: Some(*ts),
                        },
                    )
                }),
        );

        changes.sort_by_key(|(ts, _)| *ts);
        changes.into_iter().map(|(_, change)| change).collect()
    }

    /// Number of live (non-tombstoned) records.
    pub fn live_count(&self) -> usize {
        self.records.values().filter(|r| !r.is_deleted()).count()
    }
}
