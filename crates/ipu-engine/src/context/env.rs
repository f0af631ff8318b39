//! `IPU_*` environment capture and restore

use std::collections::BTreeMap;

/// Prefix of captured environment variables
pub const ENV_PREFIX: &str = "IPU_";

/// Variables renamed between releases, `(old, new)`
///
/// A run captured under the old name is restored under the new one unless
/// the new name was captured as well.
pub const LEGACY_RENAMES: &[(&str, &str)] = &[
    ("IPU_DEVEL_SKIP_RHSM", "IPU_NO_RHSM"),
    ("IPU_DEVEL_TARGET_RELEASE", "IPU_TARGET_VERSION"),
    ("IPU_DEVEL_SOURCE_PRODUCT_TYPE", "IPU_SOURCE_PRODUCT_TYPE"),
];

/// Keep only `IPU_*` variables
pub fn capture_env<I>(vars: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .collect()
}

/// Captured variables as they must be set on resume
#[must_use]
pub fn restorable_env(captured: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut restored = captured.clone();
    for (old, new) in LEGACY_RENAMES {
        if let Some(value) = restored.remove(*old) {
            restored.entry((*new).to_string()).or_insert(value);
        }
    }
    restored
}

/// Destination of restored variables
pub trait EnvironmentSink: Send {
    /// Set one variable
    fn set_var(&mut self, key: &str, value: &str);
}

/// Sets variables on the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl EnvironmentSink for ProcessEnvironment {
    fn set_var(&mut self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }
}

impl EnvironmentSink for BTreeMap<String, String> {
    fn set_var(&mut self, key: &str, value: &str) {
        self.insert(key.to_string(), value.to_string());
    }
}
