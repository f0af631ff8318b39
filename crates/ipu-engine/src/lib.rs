//! IPU Engine
//!
//! Phase-ordered actor orchestration whose execution state survives reboots.
//!
//! # Core Concepts
//!
//! - [`ActorDescriptor`]: static contract of an actor (consumes, produces, tags)
//! - [`MessageBus`]: append-only log shared by the actors of one execution
//! - [`Dispatcher`]: selects the actors of a phase and orders them
//!   producer-before-consumer
//! - [`PolicyEngine`]: turns actor outcomes into a [`PhaseResult`]
//! - [`ContextStore`]: durable [`ExecutionContext`] and [`Journal`]
//! - [`WorkflowRunner`]: runs, suspends and resumes a [`Workflow`]
//!
//! # Example
//!
//! ```rust,ignore
//! let runner = WorkflowRunner::new(&workflow, &registry, &store);
//! let result = runner
//!     .run(
//!         RunRequest::Fresh { kind: ExecutionKind::Upgrade, configuration },
//!         &RunOptions::default(),
//!         &mut answers,
//!         &mut ProcessEnvironment,
//!     )
//!     .await?;
//! ```

mod actor;
mod answerfile;
mod audit;
mod bus;
mod context;
mod dispatcher;
mod error;
mod policy;
mod runner;
mod state_machine;
mod store;
mod workflow;

pub use actor::{Actor, ActorDescriptor, ActorDescriptorBuilder, ActorRegistry, ActorStop};
pub use answerfile::Answerfile;
pub use audit::{verify_chain, AuditEvent, AuditLog};
pub use bus::{ActorContext, Consumed, MessageBus, TypedMessages};
pub use context::{
    capture_env, restorable_env, ConfigurationSnapshot, EnvironmentSink, ExecutionContext,
    ExecutionId, ExecutionKind, ProcessEnvironment, RunFlags, ENV_PREFIX, LEGACY_RENAMES,
};
pub use dispatcher::{ActorOutcome, ActorResult, DispatchFilters, Dispatcher, Flow, RunScope};
pub use error::{
    AnswerfileError, AuditError, CommandError, ContractViolation, DispatchError, EngineError,
    PersistenceError, RegistryError, StateMachineError, WorkflowError,
};
pub use policy::{ActorFailure, FailureKind, PhaseResult, PhaseStatus, PolicyEngine};
pub use runner::{PhaseSummary, RunOptions, RunOutcome, RunRequest, RunResult, WorkflowRunner};
pub use state_machine::{allowed_transitions, validate_transition, ExecutionState};
pub use store::{ContextStore, FileContextStore, Journal, MemoryContextStore};
pub use workflow::{ErrorPolicy, Phase, PhaseFlags, RetryPolicy, Workflow, WorkflowBuilder};

pub use ipu_model;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
