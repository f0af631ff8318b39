//! Workflows and phases
//!
//! A [`Workflow`] is an ordered list of [`Phase`]s sharing one workflow tag.
//! Each phase carries the policies that decide how actor failures affect it
//! and whether it may be re-executed on resume.

use crate::error::WorkflowError;
use ipu_model::Tag;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How an unexpected actor error affects the phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop at the first error and fail the phase
    #[default]
    FailPhase,
    /// Record the error, keep running the phase
    ReportOnly,
}

/// Whether a failed phase may run again on resume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Resume re-runs the phase from its start
    #[default]
    RetryPhase,
    /// Resume is refused
    Disabled,
}

/// Phase flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseFlags {
    /// Ask the operator to reboot after the phase
    pub request_restart_after_phase: bool,
    /// Reboot is required after the phase
    pub restart_after_phase: bool,
    /// Stop after the phase if any inhibitor is on the bus
    pub stop_if_inhibited: bool,
}

impl PhaseFlags {
    /// Whether the run suspends for a reboot after the phase
    #[inline]
    #[must_use]
    pub fn wants_reboot(&self) -> bool {
        self.request_restart_after_phase || self.restart_after_phase
    }
}

/// One step of a workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    name: String,
    tag: Tag,
    error_policy: ErrorPolicy,
    retry_policy: RetryPolicy,
    flags: PhaseFlags,
}

impl Phase {
    /// Create a phase with default policies
    #[must_use]
    pub fn new(name: impl Into<String>, tag: impl Into<Tag>) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            error_policy: ErrorPolicy::default(),
            retry_policy: RetryPolicy::default(),
            flags: PhaseFlags::default(),
        }
    }

    /// With error policy
    #[inline]
    #[must_use]
    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Ask for a reboot after the phase
    #[inline]
    #[must_use]
    pub fn request_restart(mut self) -> Self {
        self.flags.request_restart_after_phase = true;
        self
    }

    /// Require a reboot after the phase
    #[inline]
    #[must_use]
    pub fn restart(mut self) -> Self {
        self.flags.restart_after_phase = true;
        self
    }

    /// Stop the run after the phase when inhibitors were reported
    #[inline]
    #[must_use]
    pub fn stop_if_inhibited(mut self) -> Self {
        self.flags.stop_if_inhibited = true;
        self
    }

    /// Phase name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Phase tag
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Error policy
    #[inline]
    #[must_use]
    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    /// Retry policy
    #[inline]
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    /// Flags
    #[inline]
    #[must_use]
    pub fn flags(&self) -> PhaseFlags {
        self.flags
    }
}

/// Ordered phases sharing a workflow tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    name: String,
    tag: Tag,
    phases: Vec<Phase>,
}

impl Workflow {
    /// Start building a workflow
    #[must_use]
    pub fn builder(name: impl Into<String>, tag: impl Into<Tag>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            tag: tag.into(),
            phases: Vec::new(),
        }
    }

    /// Workflow name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Workflow tag
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Phases in execution order
    #[inline]
    #[must_use]
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Position of a phase by name
    #[must_use]
    pub fn position(&self, phase: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.name == phase)
    }

    /// Phase by name
    #[must_use]
    pub fn phase(&self, phase: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == phase)
    }
}

/// Builder for [`Workflow`]
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    name: String,
    tag: Tag,
    phases: Vec<Phase>,
}

impl WorkflowBuilder {
    /// Append a phase
    #[must_use]
    pub fn phase(mut self, phase: Phase) -> Self {
        self.phases.push(phase);
        self
    }

    /// Finish the workflow
    ///
    /// # Errors
    /// Returns [`WorkflowError::Empty`] without phases, or
    /// [`WorkflowError::DuplicatePhase`] when two phases share a name.
    pub fn build(self) -> Result<Workflow, WorkflowError> {
        if self.phases.is_empty() {
            return Err(WorkflowError::Empty(self.name));
        }
        let mut seen = HashSet::new();
        for phase in &self.phases {
            if !seen.insert(phase.name.as_str()) {
                return Err(WorkflowError::DuplicatePhase(phase.name.clone()));
            }
        }
        Ok(Workflow {
            name: self.name,
            tag: self.tag,
            phases: self.phases,
        })
    }
}
