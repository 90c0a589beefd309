//! Storage ports and implementations for offsync.
//!
//! This module provides the trait-based interfaces the sync subsystem talks to
//! (the local replica, the remote API and the pull cursor store), the
//! last-write-wins conflict policy enforced by the server of record, and
//! in-memory and JSON-file implementations of every port.
//!
//! # Design Principles
//! - Port isolation: the sync coordinators depend only on the traits here
//! - Async operations: every read and write may suspend on I/O
//! - Idempotent remote calls: upserts and deletes are safe to replay

pub mod conflict;
pub mod entity;
pub mod json;
pub mod local;
pub mod memory;
pub mod provider;
pub mod records;

pub use conflict::{accepts_write, resolve_delete, resolve_upsert, WriteDecision};
pub use entity::{RemoteChange, SyncEntity};
pub use local::{FileCursorStore, FileLocalStore, FileRemote};
pub use memory::{MemoryCursorStore, MemoryLocalStore, MemoryRemote};
pub use provider::{CursorStore, LocalStore, RemoteApi};
pub use records::RecordSet;
