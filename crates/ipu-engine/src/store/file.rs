//! File-backed context store
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/<execution-id>/context.json
//! <root>/<execution-id>/journal.json
//! ```
//!
//! Every file is written to a temporary sibling, synced, and renamed into
//! place, so a crash leaves either the old or the new version.

use super::{newest, ContextStore, Journal};
use crate::context::{ExecutionContext, ExecutionId, ExecutionKind};
use crate::error::PersistenceError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const CONTEXT_FILE: &str = "context.json";
const JOURNAL_FILE: &str = "journal.json";

/// Context store rooted at a directory
#[derive(Debug, Clone)]
pub struct FileContextStore {
    root: PathBuf,
}

impl FileContextStore {
    /// Create a store; the directory is created on first write
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn execution_dir(&self, id: &ExecutionId) -> PathBuf {
        self.root.join(id.to_string())
    }
}

impl ContextStore for FileContextStore {
    fn save(&self, context: &ExecutionContext) -> Result<(), PersistenceError> {
        let path = self.execution_dir(&context.id).join(CONTEXT_FILE);
        write_json(&path, context, "execution context")?;
        tracing::debug!(execution_id = %context.id, state = %context.state, "context saved");
        Ok(())
    }

    fn load(&self, id: &ExecutionId) -> Result<Option<ExecutionContext>, PersistenceError> {
        read_json(&self.execution_dir(id).join(CONTEXT_FILE))
    }

    fn most_recent(
        &self,
        kind: ExecutionKind,
    ) -> Result<Option<ExecutionContext>, PersistenceError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistenceError::io(&self.root, e)),
        };

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PersistenceError::io(&self.root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match read_json::<ExecutionContext>(&path.join(CONTEXT_FILE))? {
                Some(ctx) if ctx.kind == kind => candidates.push(ctx),
                Some(_) => {}
                None => tracing::warn!(dir = %path.display(), "execution directory without context"),
            }
        }
        Ok(newest(candidates))
    }

    fn save_journal(&self, id: &ExecutionId, journal: &Journal) -> Result<(), PersistenceError> {
        let path = self.execution_dir(id).join(JOURNAL_FILE);
        write_json(&path, journal, "journal")
    }

    fn load_journal(&self, id: &ExecutionId) -> Result<Journal, PersistenceError> {
        Ok(read_json(&self.execution_dir(id).join(JOURNAL_FILE))?.unwrap_or_default())
    }
}

fn write_json<T: Serialize>(
    path: &Path,
    value: &T,
    what: &'static str,
) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| PersistenceError::Encode {
        what,
        message: e.to_string(),
    })?;
    write_atomic(path, &bytes)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PersistenceError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Write `bytes` to `path` through a synced temporary file and rename
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| PersistenceError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| PersistenceError::io(dir, e))?;
    tmp.write_all(bytes)
        .map_err(|e| PersistenceError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| PersistenceError::io(tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| PersistenceError::io(path, e.error))?;

    // Make the rename itself durable
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| PersistenceError::io(dir, e))
}
