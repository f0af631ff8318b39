//! In-memory context store

use super::{newest, ContextStore, Journal};
use crate::context::{ExecutionContext, ExecutionId, ExecutionKind};
use crate::error::PersistenceError;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Volatile store, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryContextStore {
    contexts: Mutex<BTreeMap<ExecutionId, ExecutionContext>>,
    journals: Mutex<BTreeMap<ExecutionId, Journal>>,
}

impl MemoryContextStore {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored contexts
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Check if store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }
}

impl ContextStore for MemoryContextStore {
    fn save(&self, context: &ExecutionContext) -> Result<(), PersistenceError> {
        self.contexts.lock().insert(context.id, context.clone());
        Ok(())
    }

    fn load(&self, id: &ExecutionId) -> Result<Option<ExecutionContext>, PersistenceError> {
        Ok(self.contexts.lock().get(id).cloned())
    }

    fn most_recent(
        &self,
        kind: ExecutionKind,
    ) -> Result<Option<ExecutionContext>, PersistenceError> {
        let contexts = self.contexts.lock();
        Ok(newest(
            contexts.values().filter(|c| c.kind == kind).cloned(),
        ))
    }

    fn save_journal(&self, id: &ExecutionId, journal: &Journal) -> Result<(), PersistenceError> {
        self.journals.lock().insert(*id, journal.clone());
        Ok(())
    }

    fn load_journal(&self, id: &ExecutionId) -> Result<Journal, PersistenceError> {
        Ok(self.journals.lock().get(id).cloned().unwrap_or_default())
    }
}
