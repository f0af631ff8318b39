//! Execution state machine
//!
//! ```text
//! NotStarted -> Running -> AwaitingReboot -> Resumed -> Running -> Completed
//!                  |                            |
//!                  +-> Failed -> Resumed        +-> Completed / Failed
//! ```

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Created, nothing persisted yet
    NotStarted,
    /// Phases are being executed
    Running,
    /// Suspended until the machine has rebooted
    AwaitingReboot,
    /// Picked up again after a reboot, failure or interruption
    Resumed,
    /// All phases done
    Completed,
    /// Stopped by a failed phase or inhibitor
    Failed,
}

impl ExecutionState {
    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::NotStarted => "not_started",
            ExecutionState::Running => "running",
            ExecutionState::AwaitingReboot => "awaiting_reboot",
            ExecutionState::Resumed => "resumed",
            ExecutionState::Completed => "completed",
            ExecutionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Validates a state transition.
///
/// With the `strict-debug` feature an illegal transition panics instead.
///
/// # Errors
/// Returns [`StateMachineError::IllegalTransition`] if `to` is not reachable
/// from `from`.
pub fn validate_transition(
    from: ExecutionState,
    to: ExecutionState,
) -> Result<(), StateMachineError> {
    if allowed(from, to) {
        Ok(())
    } else {
        if cfg!(feature = "strict-debug") {
            panic!("Illegal state transition attempted: {from:?} -> {to:?}");
        }

        Err(StateMachineError::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: ExecutionState) -> Vec<ExecutionState> {
    use ExecutionState::{AwaitingReboot, Completed, Failed, NotStarted, Resumed, Running};
    match from {
        NotStarted => vec![Running],
        // Resumed covers a run interrupted while still marked Running
        Running => vec![AwaitingReboot, Completed, Failed, Resumed],
        AwaitingReboot | Failed => vec![Resumed],
        Resumed => vec![Running, Completed, Failed],
        Completed => vec![],
    }
}

fn allowed(from: ExecutionState, to: ExecutionState) -> bool {
    allowed_transitions(from).into_iter().any(|s| s == to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state() -> impl Strategy<Value = ExecutionState> {
        prop_oneof![
            Just(ExecutionState::NotStarted),
            Just(ExecutionState::Running),
            Just(ExecutionState::AwaitingReboot),
            Just(ExecutionState::Resumed),
            Just(ExecutionState::Completed),
            Just(ExecutionState::Failed),
        ]
    }

    #[test]
    fn reboot_cycle_is_legal() {
        use ExecutionState::*;
        let path = [NotStarted, Running, AwaitingReboot, Resumed, Running, Completed];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{pair:?}");
        }
    }

    #[cfg(not(feature = "strict-debug"))]
    #[test]
    fn completed_is_terminal() {
        assert!(ExecutionState::Completed.is_terminal());
        assert!(validate_transition(ExecutionState::Completed, ExecutionState::Resumed).is_err());
    }

    #[cfg(not(feature = "strict-debug"))]
    #[test]
    fn cannot_skip_resume() {
        let err =
            validate_transition(ExecutionState::AwaitingReboot, ExecutionState::Running).unwrap_err();
        assert_eq!(
            err.to_string(),
            "illegal transition awaiting_reboot -> running"
        );
    }

    proptest! {
        #[cfg(not(feature = "strict-debug"))]
        #[test]
        fn prop_validate_matches_table(from in state(), to in state()) {
            let listed = allowed_transitions(from).contains(&to);
            prop_assert_eq!(validate_transition(from, to).is_ok(), listed);
        }

        #[test]
        fn prop_no_transition_returns_to_not_started(from in state()) {
            prop_assert!(!allowed_transitions(from).contains(&ExecutionState::NotStarted));
        }
    }
}
