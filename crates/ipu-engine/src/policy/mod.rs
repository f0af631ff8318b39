//! Policy engine
//!
//! Wraps one dispatcher call and turns the actor outcomes into a
//! [`PhaseResult`].
//!
//! | Actor result        | `FailPhase`          | `ReportOnly`         |
//! |---------------------|----------------------|----------------------|
//! | completed / skipped | continue             | continue             |
//! | unexpected error    | stop, phase fails    | continue, recorded   |
//! | fatal stop          | stop, run terminal   | stop, run terminal   |
//! | contract violation  | stop, run terminal   | stop, run terminal   |

use crate::actor::ActorDescriptor;
use crate::dispatcher::{ActorOutcome, ActorResult, Dispatcher, Flow, RunScope};
use crate::workflow::{ErrorPolicy, Phase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Final status of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    /// Every actor completed, skipped, or failed under `ReportOnly`
    Succeeded,
    /// The phase must not be committed
    Failed,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Succeeded => f.write_str("succeeded"),
            PhaseStatus::Failed => f.write_str("failed"),
        }
    }
}

/// Category of an actor failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Actor requested a fatal stop
    Fatal,
    /// Actor broke its message contract
    ContractViolation,
    /// Unexpected error
    Unexpected,
}

/// One recorded actor failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorFailure {
    /// Actor name
    pub actor: String,
    /// Failure category
    pub kind: FailureKind,
    /// Rendered message
    pub message: String,
}

/// Outcome of one phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseResult {
    /// Phase name
    pub phase: String,
    /// Final status
    pub status: PhaseStatus,
    /// Outcomes in execution order
    pub outcomes: Vec<ActorOutcome>,
    /// Failures in execution order
    pub errors: Vec<ActorFailure>,
    /// A fatal stop or contract violation occurred
    pub terminal: bool,
}

impl PhaseResult {
    /// Whether the phase may be committed
    #[inline]
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == PhaseStatus::Succeeded
    }

    /// Names of actors that ran to completion
    #[must_use]
    pub fn completed_actors(&self) -> Vec<String> {
        self.actors_where(|r| matches!(r, ActorResult::Completed))
    }

    /// Names of actors that skipped themselves
    #[must_use]
    pub fn skipped_actors(&self) -> Vec<String> {
        self.actors_where(|r| matches!(r, ActorResult::Skipped { .. }))
    }

    fn actors_where(&self, pred: impl Fn(&ActorResult) -> bool) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| pred(&o.result))
            .map(|o| o.actor.clone())
            .collect()
    }
}

/// Applies phase policies to actor outcomes
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// Create policy engine
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Decide whether the phase continues after an outcome
    #[must_use]
    pub fn verdict(&self, phase: &Phase, outcome: &ActorOutcome) -> Flow {
        match &outcome.result {
            ActorResult::Completed | ActorResult::Skipped { .. } => Flow::Continue,
            ActorResult::Fatal { .. } | ActorResult::ContractViolation(_) => Flow::Stop,
            ActorResult::Failed { .. } => match phase.error_policy() {
                ErrorPolicy::FailPhase => Flow::Stop,
                ErrorPolicy::ReportOnly => Flow::Continue,
            },
        }
    }

    /// Run a phase through the dispatcher and judge the result
    pub async fn run_phase(
        &self,
        phase: &Phase,
        dispatcher: &Dispatcher<'_>,
        actors: &[Arc<ActorDescriptor>],
        scope: &mut RunScope<'_>,
    ) -> PhaseResult {
        let outcomes = dispatcher
            .run(phase, actors, scope, |o| self.verdict(phase, o))
            .await;
        let result = self.conclude(phase, outcomes);

        metrics::counter!(
            "ipu_phase_runs_total",
            "phase" => phase.name().to_string(),
            "status" => result.status.to_string()
        )
        .increment(1);
        result
    }

    /// Fold outcomes into a phase result
    #[must_use]
    pub fn conclude(&self, phase: &Phase, outcomes: Vec<ActorOutcome>) -> PhaseResult {
        let mut errors = Vec::new();
        let mut terminal = false;
        let mut failed = false;

        for outcome in &outcomes {
            let (kind, message) = match &outcome.result {
                ActorResult::Completed | ActorResult::Skipped { .. } => continue,
                ActorResult::Fatal { reason, details } => {
                    terminal = true;
                    let message = match details {
                        Some(d) => format!("{reason}: {d}"),
                        None => reason.clone(),
                    };
                    (FailureKind::Fatal, message)
                }
                ActorResult::ContractViolation(v) => {
                    terminal = true;
                    (FailureKind::ContractViolation, v.to_string())
                }
                ActorResult::Failed { error } => {
                    if phase.error_policy() == ErrorPolicy::FailPhase {
                        failed = true;
                    }
                    (FailureKind::Unexpected, error.clone())
                }
            };
            errors.push(ActorFailure {
                actor: outcome.actor.clone(),
                kind,
                message,
            });
        }

        let status = if failed || terminal {
            PhaseStatus::Failed
        } else {
            PhaseStatus::Succeeded
        };

        PhaseResult {
            phase: phase.name().to_string(),
            status,
            outcomes,
            errors,
            terminal,
        }
    }
}
