//! Common types used throughout offsync.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a synchronizable entity type (e.g. `"note"`).
///
/// Entity types key the handler registry, the pull cursors and every queued
/// operation, so they are validated once at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityType(String);

impl EntityType {
    /// Create a new EntityType from a string.
    ///
    /// # Errors
    /// - Returns error if the name is empty or only whitespace
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "EntityType cannot be empty".to_string(),
            ));
        }
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EntityType {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<EntityType> for String {
    fn from(value: EntityType) -> Self {
        value.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single entity within its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Milliseconds since the Unix epoch.
///
/// Used for `updatedAt`/`deletedAt` on entities and for pull cursors.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The epoch; the effective value of an absent tombstone.
    pub const ZERO: Self = Self(0);

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Convert to a chrono datetime, if representable.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.timestamp_millis())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_entity_type_creation() {
        let ty = EntityType::new("note").unwrap();
        assert_eq!(ty.as_str(), "note");
        assert_eq!(ty.to_string(), "note");
    }

    #[test]
    fn test_entity_type_empty_fails() {
        assert!(EntityType::new("").is_err());
        assert!(EntityType::new("   ").is_err());
    }

    #[test]
    fn test_entity_type_deserialize_validates() {
        let ok: EntityType = serde_json::from_str("\"task\"").unwrap();
        assert_eq!(ok.as_str(), "task");
        assert!(serde_json::from_str::<EntityType>("\"\"").is_err());
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(EntityId::generate(), EntityId::generate());
    }

    #[test]
    fn test_timestamp_ordering_and_serialization() {
        let a = Timestamp::from_millis(5);
        let b = Timestamp::from_millis(10);
        assert!(a < b);
        assert!(Timestamp::ZERO < a);
        assert_eq!(serde_json::to_string(&b).unwrap(), "10");
    }

    #[test]
    fn test_timestamp_datetime_conversion() {
        let now = Utc::now();
        let ts = Timestamp::from(now);
        assert_eq!(
            ts.to_datetime().unwrap().timestamp_millis(),
            now.timestamp_millis()
        );
    }

    proptest! {
        #[test]
        fn entity_type_accepts_any_non_blank_name(name in "[a-z_]{1,24}") {
            let ty = EntityType::new(name.clone()).unwrap();
            prop_assert_eq!(ty.as_str(), name.as_str());
        }
    }
}
