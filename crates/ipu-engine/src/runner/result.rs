//! Run results

use crate::context::{ExecutionId, ExecutionKind};
use crate::policy::{ActorFailure, PhaseResult, PhaseStatus};
use crate::state_machine::ExecutionState;
use ipu_model::Report;
use serde::Serialize;
use std::fmt;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every phase committed
    Completed,
    /// Suspended after a phase that asks for a reboot
    AwaitingReboot {
        /// Last committed phase
        phase: String,
        /// Reboot is mandatory rather than requested
        required: bool,
    },
    /// A phase failed
    Failed {
        /// Failed phase
        phase: String,
        /// Resume may re-run the phase
        retryable: bool,
    },
    /// Inhibitors were reported before an irreversible phase
    Inhibited {
        /// Phase after which the run stopped
        phase: String,
        /// Number of inhibitor reports
        inhibitors: usize,
    },
    /// Stopped after the requested last phase
    Stopped {
        /// Last executed phase
        phase: String,
    },
}

impl RunOutcome {
    /// Whether the run ended in failure
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. } | RunOutcome::Inhibited { .. })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => f.write_str("completed"),
            RunOutcome::AwaitingReboot { phase, required } => {
                let verb = if *required { "required" } else { "requested" };
                write!(f, "reboot {verb} after phase '{phase}'")
            }
            RunOutcome::Failed { phase, retryable } => {
                let hint = if *retryable {
                    "resume will retry it"
                } else {
                    "resume is not possible"
                };
                write!(f, "phase '{phase}' failed; {hint}")
            }
            RunOutcome::Inhibited { phase, inhibitors } => {
                write!(f, "{inhibitors} inhibitor(s) reported by phase '{phase}'")
            }
            RunOutcome::Stopped { phase } => write!(f, "stopped after phase '{phase}'"),
        }
    }
}

/// Per-phase summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub status: PhaseStatus,
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
    pub errors: Vec<ActorFailure>,
}

impl From<&PhaseResult> for PhaseSummary {
    fn from(result: &PhaseResult) -> Self {
        Self {
            phase: result.phase.clone(),
            status: result.status,
            executed: result.completed_actors(),
            skipped: result.skipped_actors(),
            errors: result.errors.clone(),
        }
    }
}

/// Everything the caller needs after a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    /// Execution id
    pub execution_id: ExecutionId,
    /// Kind of run
    pub kind: ExecutionKind,
    /// Persisted final state
    pub state: ExecutionState,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Phases executed by this invocation
    pub phases: Vec<PhaseSummary>,
    /// Every report on the bus, including those of an uncommitted phase
    pub reports: Vec<Report>,
}

impl RunResult {
    /// Whether the run ended in failure
    #[inline]
    #[must_use]
    pub fn failure(&self) -> bool {
        self.outcome.is_failure()
    }

    /// Inhibitor reports
    #[must_use]
    pub fn inhibitors(&self) -> Vec<&Report> {
        self.reports.iter().filter(|r| r.is_inhibitor()).collect()
    }

    /// Names of all actors that ran to completion
    #[must_use]
    pub fn executed_actors(&self) -> Vec<&str> {
        self.phases
            .iter()
            .flat_map(|p| p.executed.iter().map(String::as_str))
            .collect()
    }

    /// Process exit code
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.failure())
    }
}
