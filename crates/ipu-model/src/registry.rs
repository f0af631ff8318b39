//! Model registry
//!
//! Provides [`ModelRegistry`], the validated set of message schemas known to
//! one execution. The registry is built once at startup and never mutated
//! while a workflow runs.

use crate::error::ModelError;
use crate::message::{Message, MessageType};
use crate::model::Model;
use crate::report::Report;
use crate::schema::ModelSchema;
use std::collections::BTreeMap;

/// Registry of message schemas keyed by type name
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    schemas: BTreeMap<MessageType, ModelSchema>,
}

impl ModelRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }

    /// Create registry with the built-in models (currently [`Report`])
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert(Report::schema());
        registry
    }

    /// Register a typed model
    ///
    /// Registering the same schema twice is a no-op.
    ///
    /// # Errors
    /// Returns [`ModelError::ConflictingSchema`] if a different schema is
    /// already registered under the same name.
    pub fn register<M: Model>(&mut self) -> Result<(), ModelError> {
        self.register_schema(M::schema())
    }

    /// Register a schema declared as data
    ///
    /// # Errors
    /// Returns [`ModelError::ConflictingSchema`] on a name clash.
    pub fn register_schema(&mut self, schema: ModelSchema) -> Result<(), ModelError> {
        match self.schemas.get(&MessageType::new(schema.name.clone())) {
            Some(existing) if existing == &schema => Ok(()),
            Some(_) => Err(ModelError::ConflictingSchema(schema.name)),
            None => {
                self.insert(schema);
                Ok(())
            }
        }
    }

    fn insert(&mut self, schema: ModelSchema) {
        self.schemas
            .insert(MessageType::new(schema.name.clone()), schema);
    }

    /// Check if a message type is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, msg_type: &MessageType) -> bool {
        self.schemas.contains_key(msg_type)
    }

    /// Schema of a registered type
    #[inline]
    #[must_use]
    pub fn get(&self, msg_type: &MessageType) -> Option<&ModelSchema> {
        self.schemas.get(msg_type)
    }

    /// Validate a message draft against its registered schema
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownType`], [`ModelError::TopicMismatch`] or
    /// the payload violation reported by [`ModelSchema::validate`].
    pub fn validate(&self, message: &Message) -> Result<(), ModelError> {
        let schema = self
            .get(&message.msg_type)
            .ok_or_else(|| ModelError::UnknownType(message.msg_type.to_string()))?;

        if schema.topic != message.topic.as_str() {
            return Err(ModelError::TopicMismatch {
                model: schema.name.clone(),
                expected: schema.topic.clone(),
                actual: message.topic.to_string(),
            });
        }

        schema.validate(&message.payload)
    }

    /// Registered type names in lexical order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.schemas.keys().map(MessageType::as_str).collect()
    }

    /// Number of registered schemas
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
