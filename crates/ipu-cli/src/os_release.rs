//! `os-release` parsing

use ipu_engine::CommandError;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Identification of the running system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    /// `ID`, e.g. `rhel`
    pub id: String,
    /// `NAME`
    pub name: String,
    /// `VERSION_ID`, e.g. `8.10`
    pub version_id: String,
}

impl OsRelease {
    /// Parse `KEY=value` lines; values may be single or double quoted
    ///
    /// # Errors
    /// Message naming the first missing key.
    pub fn parse(text: &str) -> Result<Self, String> {
        let fields: BTreeMap<&str, &str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim(), unquote(value.trim())))
            .collect();

        let field = |key: &str| {
            fields
                .get(key)
                .map(|v| (*v).to_string())
                .ok_or_else(|| format!("missing {key}"))
        };
        Ok(Self {
            id: field("ID")?,
            name: field("NAME").unwrap_or_default(),
            version_id: field("VERSION_ID")?,
        })
    }

    /// Read and parse a file
    ///
    /// # Errors
    /// [`CommandError::Precondition`] when the file is unreadable or lacks
    /// `ID`/`VERSION_ID`.
    pub fn load(path: &Path) -> Result<Self, CommandError> {
        let text = fs::read_to_string(path).map_err(|e| {
            CommandError::Precondition(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text).map_err(|message| {
            CommandError::Precondition(format!("invalid {}: {message}", path.display()))
        })
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
