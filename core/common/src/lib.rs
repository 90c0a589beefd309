//! Common utilities and types shared across offsync crates.
//!
//! This module provides the error taxonomy and the identifier and time
//! newtypes used by the storage ports and the sync coordinators.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{EntityId, EntityType, Timestamp};
