//! Registry mapping entity types to their sync handlers.

use std::collections::HashMap;
use std::sync::Arc;

use offsync_common::{EntityType, Error, Result};

use crate::handler::SyncHandler;

/// Registry of sync handlers, built once at startup.
///
/// Looking up an entity type that was never registered is a configuration
/// error, not a recoverable runtime condition.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<EntityType, Arc<dyn SyncHandler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its own entity type.
    ///
    /// # Errors
    /// - Returns a configuration error if the entity type is already registered
    pub fn register(&mut self, handler: Arc<dyn SyncHandler>) -> Result<()> {
        let entity_type = handler.entity_type().clone();
        if self.handlers.contains_key(&entity_type) {
            return Err(Error::Configuration(format!(
                "Handler for '{}' is already registered",
                entity_type
            )));
        }
        self.handlers.insert(entity_type, handler);
        Ok(())
    }

    /// Chainable form of [`HandlerRegistry::register`].
    pub fn with_handler(mut self, handler: Arc<dyn SyncHandler>) -> Result<Self> {
        self.register(handler)?;
        Ok(self)
    }

    pub fn get(&self, entity_type: &EntityType) -> Option<Arc<dyn SyncHandler>> {
        self.handlers.get(entity_type).cloned()
    }

    /// Resolve the handler for `entity_type`.
    ///
    /// # Errors
    /// - Configuration error if no handler is registered
    pub fn require(&self, entity_type: &EntityType) -> Result<Arc<dyn SyncHandler>> {
        self.get(entity_type).ok_or_else(|| {
            Error::Configuration(format!(
                "No sync handler registered for entity type '{}'",
                entity_type
            ))
        })
    }

    pub fn contains(&self, entity_type: &EntityType) -> bool {
        self.handlers.contains_key(entity_type)
    }

    /// Registered entity types, sorted.
    pub fn entity_types(&self) -> Vec<EntityType> {
        let mut types: Vec<EntityType> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
