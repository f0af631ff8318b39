//! Actor registry

use super::ActorDescriptor;
use crate::error::RegistryError;
use indexmap::IndexMap;
use ipu_model::ModelRegistry;
use std::sync::Arc;

/// Registered actors of one execution
///
/// Every declared `consumes`/`produces` type must be known to the model
/// registry at registration time. Iteration follows registration order; the
/// dispatcher never relies on it.
#[derive(Debug, Clone)]
pub struct ActorRegistry {
    models: Arc<ModelRegistry>,
    actors: IndexMap<String, Arc<ActorDescriptor>>,
}

impl ActorRegistry {
    /// Create an empty registry over the given models
    #[must_use]
    pub fn new(models: ModelRegistry) -> Self {
        Self {
            models: Arc::new(models),
            actors: IndexMap::new(),
        }
    }

    /// Register an actor
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateActor`] if the name is taken,
    /// [`RegistryError::UnknownModel`] if the contract names an unregistered
    /// type, or [`RegistryError::EmptyName`].
    pub fn register(&mut self, descriptor: ActorDescriptor) -> Result<(), RegistryError> {
        if descriptor.name().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.actors.contains_key(descriptor.name()) {
            return Err(RegistryError::DuplicateActor(descriptor.name().to_string()));
        }

        let declared = descriptor
            .consumes()
            .iter()
            .chain(descriptor.produces().iter());
        for msg_type in declared {
            if !self.models.contains(msg_type) {
                return Err(RegistryError::UnknownModel {
                    actor: descriptor.name().to_string(),
                    model: msg_type.to_string(),
                });
            }
        }

        tracing::debug!(actor = descriptor.name(), "registered actor");
        self.actors
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Register several actors, stopping at the first error
    ///
    /// # Errors
    /// See [`ActorRegistry::register`].
    pub fn register_all(
        &mut self,
        descriptors: impl IntoIterator<Item = ActorDescriptor>,
    ) -> Result<(), RegistryError> {
        descriptors.into_iter().try_for_each(|d| self.register(d))
    }

    /// Look up an actor by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ActorDescriptor>> {
        self.actors.get(name)
    }

    /// Check if an actor is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.actors.contains_key(name)
    }

    /// All actors in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ActorDescriptor>> {
        self.actors.values()
    }

    /// Model registry shared by all actors
    #[inline]
    #[must_use]
    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    /// Number of registered actors
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }
}
