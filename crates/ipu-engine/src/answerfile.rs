//! Answerfile
//!
//! Operator answers to actor dialogs, stored as TOML sections:
//!
//! ```toml
//! [remove_pam_pkcs11_module_check]
//! confirm = true
//! ```
//!
//! The engine does not interpret answers; actors read and record them
//! through their [`ActorContext`](crate::ActorContext).

use crate::error::AnswerfileError;
use crate::store::write_atomic;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Dialog answers keyed by section and key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Answerfile {
    sections: BTreeMap<String, toml::Table>,
}

impl Answerfile {
    /// Load from disk; a missing file is an empty answerfile
    ///
    /// # Errors
    /// Returns [`AnswerfileError::Parse`] for malformed TOML or
    /// [`AnswerfileError::Persistence`] when the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, AnswerfileError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(crate::error::PersistenceError::io(path, e).into()),
        };
        Self::parse(&text).map_err(|message| AnswerfileError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    fn parse(text: &str) -> Result<Self, String> {
        let sections: BTreeMap<String, toml::Table> =
            toml::from_str(text).map_err(|e| e.to_string())?;
        Ok(Self { sections })
    }

    /// Write to disk atomically
    ///
    /// # Errors
    /// Returns [`AnswerfileError::Persistence`] if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), AnswerfileError> {
        let text = toml::to_string(&self.sections).map_err(|e| {
            crate::error::PersistenceError::Encode {
                what: "answerfile",
                message: e.to_string(),
            }
        })?;
        write_atomic(path, text.as_bytes())?;
        Ok(())
    }

    /// Answer for a key in a section
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&toml::Value> {
        self.sections.get(section).and_then(|t| t.get(key))
    }

    /// Record an answer, replacing any earlier one
    pub fn set(&mut self, section: &str, key: &str, value: toml::Value) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Apply a `section.key=value` assignment from the command line
    ///
    /// The value is read as a TOML literal when possible and as a plain
    /// string otherwise, so `confirm=true` stores a boolean and
    /// `mode=fast` stores `"fast"`.
    ///
    /// # Errors
    /// Returns [`AnswerfileError::InvalidAssignment`] when the section, key
    /// or `=` is missing.
    pub fn apply_assignment(&mut self, assignment: &str) -> Result<(), AnswerfileError> {
        let invalid = || AnswerfileError::InvalidAssignment(assignment.to_string());
        let (path, raw) = assignment.split_once('=').ok_or_else(invalid)?;
        let (section, key) = path.trim().split_once('.').ok_or_else(invalid)?;
        if section.is_empty() || key.is_empty() {
            return Err(invalid());
        }
        self.set(section, key, parse_value(raw.trim()));
        Ok(())
    }

    /// Number of sections
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Check if no answers are recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

fn parse_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("v = {raw}"))
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}
