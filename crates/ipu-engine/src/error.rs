//! Error types for the IPU engine
//!
//! Errors fall into three tiers:
//! - [`CommandError`]: the operator asked for something the engine will not
//!   do (resume without a prior run, resume a completed run, ...)
//! - [`PersistenceError`]: durable state could not be read or written; always
//!   fatal for the run
//! - Configuration errors ([`DispatchError`], [`RegistryError`],
//!   [`WorkflowError`]): the actor set or workflow definition is inconsistent
//!
//! Actor-level failures are not errors of the engine; they are collected into
//! a [`crate::PhaseResult`] and judged by the [`crate::PolicyEngine`].

use ipu_model::ModelError;
use std::path::PathBuf;

/// Top-level engine error
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Operator-level refusal
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Durable state could not be read or written
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Phase plan could not be computed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Actor registration failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Illegal execution state change
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),
}

impl EngineError {
    /// Whether the error was caused by the operator's request rather than by
    /// the system
    #[must_use]
    pub fn is_command_error(&self) -> bool {
        matches!(self, EngineError::Command(_))
    }

    /// Process exit code for this error
    ///
    /// Command errors exit with 2 so scripts can tell them apart from a
    /// failed upgrade (1).
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Command(_) => 2,
            EngineError::Persistence(_) => 3,
            EngineError::Dispatch(_) | EngineError::Registry(_) => 4,
            EngineError::StateMachine(_) => 5,
        }
    }
}

/// Operator-level refusal
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Resume requested but nothing was ever persisted
    #[error("no previous run to resume")]
    NothingToResume,

    /// Resume requested for an unknown execution id
    #[error("execution {0} not found")]
    UnknownExecution(String),

    /// Execution id could not be parsed
    #[error("invalid execution id '{0}'")]
    InvalidExecutionId(String),

    /// The previous run already finished
    #[error("previous run {id} already completed; start a new run instead")]
    AlreadyCompleted {
        /// Execution id of the finished run
        id: String,
    },

    /// The failed phase must not be re-executed
    #[error("phase '{phase}' does not allow retry; resume is not possible")]
    NotRetryable {
        /// Phase that would be re-executed
        phase: String,
    },

    /// The previous run was stopped by an actor and must not continue
    #[error("run was stopped fatally in phase '{phase}'; resume is not possible")]
    FatalStop {
        /// Phase in which the fatal stop occurred
        phase: String,
    },

    /// The persisted run belongs to another workflow
    #[error("execution {id} belongs to workflow '{found}', not '{expected}'")]
    WorkflowMismatch {
        /// Execution id
        id: String,
        /// Workflow being run now
        expected: String,
        /// Workflow recorded in the persisted context
        found: String,
    },

    /// A phase name given on the command line is not part of the workflow
    #[error("unknown phase '{0}'")]
    UnknownPhase(String),

    /// Host precondition not met (privileges, supported version, ...)
    #[error("{0}")]
    Precondition(String),
}

/// Durable state failure
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// File system operation failed
    #[error("i/o error on {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Persisted record could not be decoded
    #[error("corrupt record {path}: {message}")]
    Corrupt {
        /// Path of the record
        path: PathBuf,
        /// Decoder message
        message: String,
    },

    /// Record could not be encoded
    #[error("failed to encode {what}: {message}")]
    Encode {
        /// What was being encoded
        what: &'static str,
        /// Encoder message
        message: String,
    },

    /// Persisted state does not fit the current workflow
    #[error("inconsistent persisted state: {0}")]
    Inconsistent(String),

    /// Store refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl PersistenceError {
    /// I/O error on a path
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Phase plan failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Actors of one phase depend on each other in a cycle
    #[error("dependency cycle in phase '{phase}' between: {}", .members.join(", "))]
    Cycle {
        /// Phase being planned
        phase: String,
        /// Actors in the cycle, lexically sorted
        members: Vec<String>,
    },
}

/// Actor registration failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Actor name already taken
    #[error("actor '{0}' is already registered")]
    DuplicateActor(String),

    /// Actor declares a message type unknown to the model registry
    #[error("actor '{actor}' declares unknown model '{model}'")]
    UnknownModel {
        /// Actor name
        actor: String,
        /// Undeclared model
        model: String,
    },

    /// Actor name is empty
    #[error("actor name must not be empty")]
    EmptyName,
}

/// Workflow definition failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// Workflow has no phases
    #[error("workflow '{0}' has no phases")]
    Empty(String),

    /// Two phases share a name
    #[error("duplicate phase '{0}'")]
    DuplicatePhase(String),
}

/// Illegal execution state change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not allowed
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },
}

/// An actor broke its declared message contract
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    /// Produced a type not in its `produces` set
    #[error("actor '{actor}' may not produce '{message_type}'")]
    UndeclaredProduce {
        /// Offending actor
        actor: String,
        /// Message type
        message_type: String,
    },

    /// Consumed a type not in its `consumes` set
    #[error("actor '{actor}' may not consume '{message_type}'")]
    UndeclaredConsume {
        /// Offending actor
        actor: String,
        /// Message type
        message_type: String,
    },

    /// Produced or consumed message does not match its schema
    #[error("actor '{actor}' exchanged an invalid message: {source}")]
    InvalidMessage {
        /// Offending actor
        actor: String,
        /// Schema violation
        #[source]
        source: ModelError,
    },
}

/// Answerfile failure
#[derive(Debug, thiserror::Error)]
pub enum AnswerfileError {
    /// Answerfile could not be parsed
    #[error("invalid answerfile {path}: {message}")]
    Parse {
        /// Answerfile path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Answer given on the command line is malformed
    #[error("invalid answer '{0}', expected <section>.<key>=<value>")]
    InvalidAssignment(String),

    /// Answerfile could not be read or written
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Audit log failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// Hash chain broken at the given event index
    #[error("audit chain broken at event {index}")]
    IntegrityViolation {
        /// Index of the first bad event
        index: usize,
    },
}
