//! Reports
//!
//! A [`Report`] is an ordinary model produced onto the bus. It is also the one
//! message whose content affects control flow: a report in the
//! [`Group::Inhibitor`] group forbids entering irreversible phases.

use crate::model::Model;
use crate::schema::{Field, FieldKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Report severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(name)
    }
}

/// Report group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    /// Blocks the upgrade from proceeding past the checks
    Inhibitor,
    /// Actor failure surfaced as a report
    Error,
    Boot,
    Drivers,
    Filesystem,
    Kernel,
    Network,
    OsFacts,
    Repository,
    Sanity,
    Security,
    Selinux,
    Services,
    Tools,
    UpgradeProcess,
}

/// A structured finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub title: String,
    pub summary: String,
    pub severity: Severity,
    pub groups: Vec<Group>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// Stable identifier used to deduplicate repeated findings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Report {
    /// Create an informational report
    #[must_use]
    pub fn new(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: summary.into(),
            severity: Severity::Info,
            groups: Vec::new(),
            remediation: None,
            key: None,
        }
    }

    /// Create a high-severity inhibitor
    #[must_use]
    pub fn inhibitor(title: impl Into<String>, summary: impl Into<String>) -> Self {
        Self::new(title, summary)
            .with_severity(Severity::High)
            .with_group(Group::Inhibitor)
    }

    /// With severity
    #[inline]
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// With an additional group
    #[must_use]
    pub fn with_group(mut self, group: Group) -> Self {
        if !self.groups.contains(&group) {
            self.groups.push(group);
        }
        self
    }

    /// With remediation hint
    #[inline]
    #[must_use]
    pub fn with_remediation(mut self, hint: impl Into<String>) -> Self {
        self.remediation = Some(hint.into());
        self
    }

    /// With deduplication key
    #[inline]
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Whether this report blocks the upgrade
    #[inline]
    #[must_use]
    pub fn is_inhibitor(&self) -> bool {
        self.groups.contains(&Group::Inhibitor)
    }
}

impl Model for Report {
    const NAME: &'static str = "Report";
    const TOPIC: &'static str = "ReportTopic";

    fn fields() -> Vec<Field> {
        vec![
            Field::required("title", FieldKind::String),
            Field::required("summary", FieldKind::String),
            Field::required("severity", FieldKind::String),
            Field::required("groups", FieldKind::List),
            Field::optional("remediation", FieldKind::String),
            Field::optional("key", FieldKind::String),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::registry::ModelRegistry;

    #[test]
    fn inhibitor_constructor_sets_group_and_severity() {
        let report = Report::inhibitor("Unsupported target", "9.9 is not supported");
        assert!(report.is_inhibitor());
        assert_eq!(report.severity, Severity::High);
    }

    #[test]
    fn plain_report_is_not_inhibitor() {
        let report = Report::new("Info", "nothing to see").with_group(Group::OsFacts);
        assert!(!report.is_inhibitor());
    }

    #[test]
    fn groups_are_deduplicated() {
        let report = Report::new("t", "s")
            .with_group(Group::Kernel)
            .with_group(Group::Kernel);
        assert_eq!(report.groups, vec![Group::Kernel]);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Info < Severity::Low);
    }

    #[test]
    fn report_payload_satisfies_its_schema() {
        let registry = ModelRegistry::with_builtins();
        let msg = Message::from_model(
            &Report::inhibitor("t", "s").with_remediation("upgrade to 8.10 first"),
        )
        .unwrap();
        assert!(registry.validate(&msg).is_ok());
        assert_eq!(msg.payload["groups"][0], "inhibitor");
    }
}
