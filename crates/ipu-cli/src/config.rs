//! Host configuration
//!
//! Read from `$IPU_CONFIG`, falling back to `/etc/ipu/ipu.toml`. A missing
//! default file means built-in defaults; an explicitly named file must exist.
//!
//! ```toml
//! store_dir = "/var/lib/ipu"
//! log_dir = "/var/log/ipu"
//! answerfile = "/var/lib/ipu/answerfile.toml"
//! require_root = true
//!
//! [upgrade_paths]
//! "8.10" = ["9.4", "9.6"]
//!
//! [default_target]
//! "8.10" = "9.6"
//! ```

use ipu_engine::CommandError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/ipu/ipu.toml";

/// Environment variable naming an alternative configuration file
pub const CONFIG_ENV: &str = "IPU_CONFIG";

/// Host configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IpuConfig {
    /// Root of the execution context store
    pub store_dir: PathBuf,
    /// Directory of the JSON run logs
    pub log_dir: PathBuf,
    /// Answerfile location
    pub answerfile: PathBuf,
    /// `os-release` file describing the running system
    pub os_release: PathBuf,
    /// Refuse to run unless effective uid is 0
    pub require_root: bool,
    /// Supported targets per source version
    pub upgrade_paths: BTreeMap<String, Vec<String>>,
    /// Target used when `--target` is absent
    pub default_target: BTreeMap<String, String>,
}

impl Default for IpuConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("/var/lib/ipu"),
            log_dir: PathBuf::from("/var/log/ipu"),
            answerfile: PathBuf::from("/var/lib/ipu/answerfile.toml"),
            os_release: PathBuf::from("/etc/os-release"),
            require_root: true,
            upgrade_paths: BTreeMap::from([
                ("8.10".to_string(), vec!["9.4".to_string(), "9.6".to_string()]),
                ("9.6".to_string(), vec!["10.0".to_string()]),
            ]),
            default_target: BTreeMap::from([
                ("8.10".to_string(), "9.6".to_string()),
                ("9.6".to_string(), "10.0".to_string()),
            ]),
        }
    }
}

impl IpuConfig {
    /// Load from `$IPU_CONFIG` or the default location
    ///
    /// # Errors
    /// [`CommandError::Precondition`] when the file cannot be read or parsed.
    pub fn load() -> Result<Self, CommandError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(Path::new(&path), true),
            None => Self::load_from(Path::new(DEFAULT_CONFIG_PATH), false),
        }
    }

    /// Load a specific file
    ///
    /// # Errors
    /// [`CommandError::Precondition`] when the file is unreadable, invalid,
    /// or missing while `required`.
    pub fn load_from(path: &Path, required: bool) -> Result<Self, CommandError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no configuration file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(CommandError::Precondition(format!(
                    "cannot read configuration {}: {e}",
                    path.display()
                )))
            }
        };
        Self::parse(&text).map_err(|message| {
            CommandError::Precondition(format!(
                "invalid configuration {}: {message}",
                path.display()
            ))
        })
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Parser message on invalid TOML or unknown keys.
    pub fn parse(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| e.message().to_string())
    }

    /// Target version for `source`
    ///
    /// The requested version when given, else the configured default.
    ///
    /// # Errors
    /// [`CommandError::Precondition`] when neither is available.
    pub fn target_for(&self, source: &str, requested: Option<&str>) -> Result<String, CommandError> {
        if let Some(target) = requested {
            return Ok(target.to_string());
        }
        self.default_target.get(source).cloned().ok_or_else(|| {
            CommandError::Precondition(format!(
                "no default target for source version {source}; use --target"
            ))
        })
    }

    /// Whether `source -> target` is a configured upgrade path
    #[must_use]
    pub fn supports(&self, source: &str, target: &str) -> bool {
        self.upgrade_paths
            .get(source)
            .is_some_and(|targets| targets.iter().any(|t| t == target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = IpuConfig::parse("store_dir = \"/tmp/ipu\"\nrequire_root = false\n").unwrap();
        assert_eq!(config.store_dir, PathBuf::from("/tmp/ipu"));
        assert!(!config.require_root);
        assert_eq!(config.log_dir, IpuConfig::default().log_dir);
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(IpuConfig::parse("stor_dir = \"/tmp\"").is_err());
    }

    #[test]
    fn test_missing_optional_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = IpuConfig::load_from(&dir.path().join("absent.toml"), false).unwrap();
        assert_eq!(config, IpuConfig::default());
    }

    #[test]
    fn test_missing_required_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = IpuConfig::load_from(&dir.path().join("absent.toml"), true).unwrap_err();
        assert!(matches!(err, CommandError::Precondition(_)));
    }

    #[test]
    fn test_target_selection() {
        let config = IpuConfig::default();
        assert_eq!(config.target_for("8.10", None).unwrap(), "9.6");
        assert_eq!(config.target_for("8.10", Some("9.4")).unwrap(), "9.4");
        assert!(config.target_for("7.9", None).is_err());
        assert!(config.supports("8.10", "9.4"));
        assert!(!config.supports("8.10", "10.0"));
    }
}
