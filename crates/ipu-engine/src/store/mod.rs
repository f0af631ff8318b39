//! Execution context store
//!
//! Persists [`ExecutionContext`]s and their [`Journal`]s so a run can continue
//! after a reboot. The runner writes the journal of a phase first and the
//! context second; the context write is the commit point of the phase.

mod file;
mod memory;

pub use file::FileContextStore;
pub use memory::MemoryContextStore;

pub(crate) use file::write_atomic;

use crate::audit::AuditEvent;
use crate::context::{ExecutionContext, ExecutionId, ExecutionKind};
use crate::error::PersistenceError;
use ipu_model::Message;
use serde::{Deserialize, Serialize};

/// Committed messages and audit trail of one execution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Journal {
    /// Messages of committed phases
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Full audit trail, including uncommitted phases
    #[serde(default)]
    pub audit: Vec<AuditEvent>,
}

/// Durable storage of execution contexts
#[cfg_attr(test, mockall::automock)]
pub trait ContextStore: Send + Sync {
    /// Write a context, replacing any earlier version
    ///
    /// # Errors
    /// Returns [`PersistenceError`] if the write is not durable.
    fn save(&self, context: &ExecutionContext) -> Result<(), PersistenceError>;

    /// Read a context by id
    ///
    /// # Errors
    /// Returns [`PersistenceError::Corrupt`] for unreadable records.
    fn load(&self, id: &ExecutionId) -> Result<Option<ExecutionContext>, PersistenceError>;

    /// Most recently created context of a kind
    ///
    /// # Errors
    /// Returns [`PersistenceError`] if any candidate record is unreadable.
    fn most_recent(
        &self,
        kind: ExecutionKind,
    ) -> Result<Option<ExecutionContext>, PersistenceError>;

    /// Write the journal of a context
    ///
    /// # Errors
    /// Returns [`PersistenceError`] if the write is not durable.
    fn save_journal(&self, id: &ExecutionId, journal: &Journal) -> Result<(), PersistenceError>;

    /// Read the journal of a context; a missing journal is empty
    ///
    /// # Errors
    /// Returns [`PersistenceError::Corrupt`] for unreadable records.
    fn load_journal(&self, id: &ExecutionId) -> Result<Journal, PersistenceError>;
}

/// Pick the newest context by creation time, ties broken by id
pub(crate) fn newest<I>(contexts: I) -> Option<ExecutionContext>
where
    I: IntoIterator<Item = ExecutionContext>,
{
    contexts
        .into_iter()
        .max_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)))
}
