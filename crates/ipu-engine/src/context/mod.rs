//! Execution context
//!
//! The durable record of one run: identity, configuration captured at start,
//! lifecycle state and the last committed phase. Everything a resumed run
//! needs to continue after a reboot is in here or in the journal kept by the
//! [`ContextStore`](crate::ContextStore).

mod env;

pub use env::{
    capture_env, restorable_env, EnvironmentSink, ProcessEnvironment, ENV_PREFIX, LEGACY_RENAMES,
};

use crate::error::{CommandError, StateMachineError};
use crate::state_machine::{validate_transition, ExecutionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Unique, time-sortable execution identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Ulid);

impl ExecutionId {
    /// Fresh id
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExecutionId {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|_| CommandError::InvalidExecutionId(s.to_string()))
    }
}

/// Kind of run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionKind {
    /// Analysis only, stops after the report phase
    Preupgrade,
    /// Full upgrade
    Upgrade,
}

impl fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionKind::Preupgrade => f.write_str("preupgrade"),
            ExecutionKind::Upgrade => f.write_str("upgrade"),
        }
    }
}

/// Operator switches recorded with the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunFlags {
    /// Skip subscription-manager handling
    pub no_rhsm: bool,
    /// Debug output requested
    pub debug: bool,
    /// Verbose output requested
    pub verbose: bool,
    /// Extra repositories to enable on the target
    pub enable_repos: Vec<String>,
    /// Experimental actors allowed to run
    pub whitelist_experimental: Vec<String>,
}

/// Configuration captured when the run started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSnapshot {
    /// Version being upgraded from
    pub source_version: String,
    /// Version being upgraded to
    pub target_version: String,
    /// Machine architecture
    pub architecture: String,
    /// Operator switches
    #[serde(default)]
    pub flags: RunFlags,
    /// Captured `IPU_*` environment, restored on resume
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl ConfigurationSnapshot {
    /// Snapshot with default flags and no environment
    #[must_use]
    pub fn new(
        source_version: impl Into<String>,
        target_version: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        Self {
            source_version: source_version.into(),
            target_version: target_version.into(),
            architecture: architecture.into(),
            flags: RunFlags::default(),
            env: BTreeMap::new(),
        }
    }

    /// With flags
    #[must_use]
    pub fn with_flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    /// With captured environment
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// Durable record of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Execution id
    pub id: ExecutionId,
    /// Kind of run
    pub kind: ExecutionKind,
    /// Workflow name
    pub workflow: String,
    /// Configuration captured at start
    pub configuration: ConfigurationSnapshot,
    /// Lifecycle state
    pub state: ExecutionState,
    /// Last phase whose effects are committed
    pub last_completed_phase: Option<String>,
    /// Phase that failed, if any
    pub failed_phase: Option<String>,
    /// Run ended in failure (failed phase or inhibitor)
    pub failure: bool,
    /// Failure was a fatal actor stop; resume is refused
    #[serde(default)]
    pub fatal_stop: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last state change
    pub updated_at: DateTime<Utc>,
}

impl ExecutionContext {
    /// New context in [`ExecutionState::NotStarted`]
    #[must_use]
    pub fn new(
        kind: ExecutionKind,
        workflow: impl Into<String>,
        configuration: ConfigurationSnapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ExecutionId::new(),
            kind,
            workflow: workflow.into(),
            configuration,
            state: ExecutionState::NotStarted,
            last_completed_phase: None,
            failed_phase: None,
            failure: false,
            fatal_stop: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to another state
    ///
    /// # Errors
    /// Returns [`StateMachineError`] for an illegal transition; the context is
    /// unchanged in that case.
    pub fn transition(&mut self, to: ExecutionState) -> Result<(), StateMachineError> {
        validate_transition(self.state, to)?;
        tracing::debug!(execution_id = %self.id, from = %self.state, to = %to, "state change");
        self.state = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a committed phase
    pub fn commit_phase(&mut self, phase: &str) {
        self.last_completed_phase = Some(phase.to_string());
        self.failed_phase = None;
        self.updated_at = Utc::now();
    }

    /// Record a failed phase
    pub fn fail_phase(&mut self, phase: &str, fatal: bool) {
        self.failed_phase = Some(phase.to_string());
        self.failure = true;
        self.fatal_stop = fatal;
        self.updated_at = Utc::now();
    }

    /// Clear failure markers before re-running a failed phase
    pub fn clear_failure(&mut self) {
        self.failed_phase = None;
        self.failure = false;
        self.fatal_stop = false;
    }
}
