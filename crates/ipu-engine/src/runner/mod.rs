//! Workflow runner
//!
//! Drives a [`Workflow`] phase by phase for one execution:
//!
//! 1. Create a fresh context, or load the persisted one on resume
//! 2. Plan every remaining phase before anything runs; a dependency cycle
//!    aborts here with no side effects
//! 3. On resume, restore the captured `IPU_*` environment
//! 4. Persist the context, then run each phase through the policy engine
//! 5. After each successful phase, write the journal and then the context;
//!    the context write commits the phase
//!
//! The run stops after a failed phase, after a phase flagged
//! `stop_if_inhibited` when inhibitors are on the bus, after a phase that
//! asks for a reboot, or after the requested last phase.

mod result;

pub use result::{PhaseSummary, RunOutcome, RunResult};

use crate::actor::{ActorDescriptor, ActorRegistry};
use crate::answerfile::Answerfile;
use crate::audit::AuditLog;
use crate::bus::MessageBus;
use crate::context::{
    restorable_env, ConfigurationSnapshot, EnvironmentSink, ExecutionContext, ExecutionId,
    ExecutionKind,
};
use crate::dispatcher::{DispatchFilters, Dispatcher, RunScope};
use crate::error::{CommandError, EngineError, PersistenceError};
use crate::policy::PolicyEngine;
use crate::state_machine::ExecutionState;
use crate::store::{ContextStore, Journal};
use crate::workflow::{Phase, RetryPolicy, Workflow};
use std::sync::Arc;

/// Fresh run or continuation of an earlier one
#[derive(Debug, Clone)]
pub enum RunRequest {
    /// Start a new execution
    Fresh {
        /// Kind of run
        kind: ExecutionKind,
        /// Configuration to capture
        configuration: ConfigurationSnapshot,
    },
    /// Continue a persisted execution
    Resume {
        /// Kind of run to look up when no id is given
        kind: ExecutionKind,
        /// Specific execution; the most recent of `kind` otherwise
        id: Option<ExecutionId>,
    },
}

/// Per-invocation options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Actor selection filters, merged with the whitelist recorded in the
    /// context
    pub filters: DispatchFilters,
    /// Last phase to execute
    pub until_phase: Option<String>,
}

type PhasePlan<'w> = Vec<(&'w Phase, Vec<Arc<ActorDescriptor>>)>;

/// Executes a workflow against a registry and a store
pub struct WorkflowRunner<'a> {
    workflow: &'a Workflow,
    registry: &'a ActorRegistry,
    store: &'a dyn ContextStore,
    policy: PolicyEngine,
}

impl<'a> WorkflowRunner<'a> {
    /// Create runner
    #[must_use]
    pub fn new(
        workflow: &'a Workflow,
        registry: &'a ActorRegistry,
        store: &'a dyn ContextStore,
    ) -> Self {
        Self {
            workflow,
            registry,
            store,
            policy: PolicyEngine::new(),
        }
    }

    /// Run the workflow
    ///
    /// # Errors
    /// - [`CommandError`] when a resume is impossible; nothing runs
    /// - [`crate::DispatchError`] when a phase cannot be planned; nothing
    ///   runs and nothing is persisted
    /// - [`PersistenceError`] when state cannot be written; the run stops
    pub async fn run(
        &self,
        request: RunRequest,
        options: &RunOptions,
        answers: &mut Answerfile,
        env: &mut dyn EnvironmentSink,
    ) -> Result<RunResult, EngineError> {
        let resuming = matches!(request, RunRequest::Resume { .. });
        let (mut context, start, journal) = match request {
            RunRequest::Fresh {
                kind,
                configuration,
            } => (
                ExecutionContext::new(kind, self.workflow.name(), configuration),
                0,
                Journal::default(),
            ),
            RunRequest::Resume { kind, id } => self.prepare_resume(kind, id)?,
        };

        let end = self.end_index(options.until_phase.as_deref())?;
        let mut filters = options.filters.clone();
        filters.whitelist_experimental.extend(
            context
                .configuration
                .flags
                .whitelist_experimental
                .iter()
                .cloned(),
        );
        let dispatcher = Dispatcher::new(self.registry);
        let plan = self.plan(&dispatcher, start, end, &filters)?;

        tracing::info!(
            execution_id = %context.id,
            workflow = self.workflow.name(),
            kind = %context.kind,
            resuming,
            phases = plan.len(),
            "run starting"
        );

        let audit = AuditLog::from_events(journal.audit);
        if resuming {
            for (key, value) in restorable_env(&context.configuration.env) {
                env.set_var(&key, &value);
            }
            context.clear_failure();
            change_state(&mut context, &audit, ExecutionState::Resumed)?;
        } else {
            change_state(&mut context, &audit, ExecutionState::Running)?;
        }
        self.store.save(&context)?;

        let bus = MessageBus::with_messages(Arc::clone(self.registry.models()), journal.messages);
        let mut summaries = Vec::with_capacity(plan.len());
        let mut outcome = None;

        if resuming && !plan.is_empty() {
            change_state(&mut context, &audit, ExecutionState::Running)?;
        }

        for (phase, actors) in &plan {
            let committed = bus.len();
            tracing::info!(execution_id = %context.id, phase = phase.name(), actors = actors.len(), "phase starting");
            audit.record(context.id, Some(phase.name()), None, "phase_started", "");

            let result = {
                let mut scope = RunScope {
                    bus: &bus,
                    execution: &context,
                    answers: &mut *answers,
                    audit: &audit,
                };
                self.policy
                    .run_phase(phase, &dispatcher, actors, &mut scope)
                    .await
            };
            audit.record(
                context.id,
                Some(phase.name()),
                None,
                "phase_finished",
                &result.status.to_string(),
            );
            summaries.push(PhaseSummary::from(&result));

            if !result.succeeded() {
                tracing::error!(phase = phase.name(), errors = result.errors.len(), "phase failed");
                context.fail_phase(phase.name(), result.terminal);
                change_state(&mut context, &audit, ExecutionState::Failed)?;
                self.persist(&context, &bus, committed, &audit)?;
                outcome = Some(RunOutcome::Failed {
                    phase: phase.name().to_string(),
                    retryable: !result.terminal
                        && phase.retry_policy() == RetryPolicy::RetryPhase,
                });
                break;
            }

            if phase.flags().stop_if_inhibited && bus.has_inhibitors() {
                let inhibitors = bus.reports().iter().filter(|r| r.is_inhibitor()).count();
                tracing::warn!(phase = phase.name(), inhibitors, "upgrade inhibited");
                context.fail_phase(phase.name(), false);
                change_state(&mut context, &audit, ExecutionState::Failed)?;
                self.persist(&context, &bus, committed, &audit)?;
                outcome = Some(RunOutcome::Inhibited {
                    phase: phase.name().to_string(),
                    inhibitors,
                });
                break;
            }

            context.commit_phase(phase.name());
            let is_last_planned = options.until_phase.as_deref() == Some(phase.name())
                && end < self.workflow.phases().len();
            if is_last_planned {
                change_state(&mut context, &audit, ExecutionState::Completed)?;
                outcome = Some(RunOutcome::Stopped {
                    phase: phase.name().to_string(),
                });
            } else if phase.flags().wants_reboot() {
                change_state(&mut context, &audit, ExecutionState::AwaitingReboot)?;
                outcome = Some(RunOutcome::AwaitingReboot {
                    phase: phase.name().to_string(),
                    required: phase.flags().restart_after_phase,
                });
            }
            self.persist(&context, &bus, bus.len(), &audit)?;
            tracing::info!(execution_id = %context.id, phase = phase.name(), "phase committed");

            if outcome.is_some() {
                break;
            }
        }

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => {
                change_state(&mut context, &audit, ExecutionState::Completed)?;
                self.persist(&context, &bus, bus.len(), &audit)?;
                RunOutcome::Completed
            }
        };

        tracing::info!(execution_id = %context.id, state = %context.state, %outcome, "run finished");
        Ok(RunResult {
            execution_id: context.id,
            kind: context.kind,
            state: context.state,
            outcome,
            phases: summaries,
            reports: bus.reports(),
        })
    }

    fn prepare_resume(
        &self,
        kind: ExecutionKind,
        id: Option<ExecutionId>,
    ) -> Result<(ExecutionContext, usize, Journal), EngineError> {
        let context = match id {
            Some(id) => self
                .store
                .load(&id)?
                .ok_or_else(|| CommandError::UnknownExecution(id.to_string()))?,
            None => self
                .store
                .most_recent(kind)?
                .ok_or(CommandError::NothingToResume)?,
        };

        if context.workflow != self.workflow.name() {
            return Err(CommandError::WorkflowMismatch {
                id: context.id.to_string(),
                expected: self.workflow.name().to_string(),
                found: context.workflow,
            }
            .into());
        }

        let start = match context.last_completed_phase.as_deref() {
            Some(name) => {
                self.workflow.position(name).ok_or_else(|| {
                    PersistenceError::Inconsistent(format!(
                        "phase '{name}' is not part of workflow '{}'",
                        self.workflow.name()
                    ))
                })? + 1
            }
            None => 0,
        };

        match context.state {
            ExecutionState::Completed => {
                return Err(CommandError::AlreadyCompleted {
                    id: context.id.to_string(),
                }
                .into());
            }
            ExecutionState::AwaitingReboot => {}
            ExecutionState::NotStarted
            | ExecutionState::Running
            | ExecutionState::Resumed
            | ExecutionState::Failed => {
                let next = self.workflow.phases().get(start);
                if context.fatal_stop {
                    return Err(CommandError::FatalStop {
                        phase: context
                            .failed_phase
                            .clone()
                            .unwrap_or_else(|| next.map(|p| p.name().to_string()).unwrap_or_default()),
                    }
                    .into());
                }
                if let Some(phase) = next {
                    if phase.retry_policy() == RetryPolicy::Disabled {
                        return Err(CommandError::NotRetryable {
                            phase: phase.name().to_string(),
                        }
                        .into());
                    }
                }
            }
        }

        let mut journal = self.store.load_journal(&context.id)?;
        let committed: Vec<&str> = self.workflow.phases()[..start]
            .iter()
            .map(Phase::name)
            .collect();
        let before = journal.messages.len();
        journal
            .messages
            .retain(|m| committed.contains(&m.phase.as_str()));
        if journal.messages.len() < before {
            tracing::warn!(
                execution_id = %context.id,
                dropped = before - journal.messages.len(),
                "discarding journal messages of uncommitted phases"
            );
        }
        tracing::info!(
            execution_id = %context.id,
            state = %context.state,
            last_completed = ?context.last_completed_phase,
            "resuming execution"
        );
        Ok((context, start, journal))
    }

    fn end_index(&self, until_phase: Option<&str>) -> Result<usize, CommandError> {
        match until_phase {
            Some(name) => self
                .workflow
                .position(name)
                .map(|i| i + 1)
                .ok_or_else(|| CommandError::UnknownPhase(name.to_string())),
            None => Ok(self.workflow.phases().len()),
        }
    }

    fn plan(
        &self,
        dispatcher: &Dispatcher<'_>,
        start: usize,
        end: usize,
        filters: &DispatchFilters,
    ) -> Result<PhasePlan<'a>, EngineError> {
        let phases: &'a [Phase] = self.workflow.phases();
        let remaining = phases.get(start..end).unwrap_or(&[]);
        remaining
            .iter()
            .map(|phase| {
                dispatcher
                    .select_for_phase(phase, self.workflow.tag(), filters)
                    .map(|actors| (phase, actors))
                    .map_err(EngineError::from)
            })
            .collect()
    }

    fn persist(
        &self,
        context: &ExecutionContext,
        bus: &MessageBus,
        committed: usize,
        audit: &AuditLog,
    ) -> Result<(), PersistenceError> {
        let journal = Journal {
            messages: bus.prefix(committed),
            audit: audit.events(),
        };
        self.store.save_journal(&context.id, &journal)?;
        self.store.save(context)
    }
}

fn change_state(
    context: &mut ExecutionContext,
    audit: &AuditLog,
    to: ExecutionState,
) -> Result<(), EngineError> {
    context.transition(to)?;
    audit.record(context.id, None, None, "state_changed", &to.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorStop};
    use crate::bus::ActorContext;
    use crate::store::{MemoryContextStore, MockContextStore};
    use ipu_model::{ModelRegistry, Report};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl Actor for Counting {
        async fn process(&self, _ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Inhibit;

    #[async_trait::async_trait]
    impl Actor for Inhibit {
        async fn process(&self, ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
            ctx.report(&Report::inhibitor("blocked", "cannot upgrade"))?;
            Ok(())
        }
    }

    fn workflow() -> Workflow {
        Workflow::builder("TestWorkflow", "TestWorkflow")
            .phase(Phase::new("First", "FirstPhase").stop_if_inhibited())
            .phase(Phase::new("Second", "SecondPhase"))
            .build()
            .unwrap()
    }

    fn registry(counter: &Arc<AtomicUsize>) -> ActorRegistry {
        let mut registry = ActorRegistry::new(ModelRegistry::with_builtins());
        for (name, phase) in [("one", "FirstPhase"), ("two", "SecondPhase")] {
            registry
                .register(
                    ActorDescriptor::builder(name)
                        .tag("TestWorkflow")
                        .tag(phase)
                        .build(Counting(Arc::clone(counter))),
                )
                .unwrap();
        }
        registry
    }

    fn fresh() -> RunRequest {
        RunRequest::Fresh {
            kind: ExecutionKind::Upgrade,
            configuration: ConfigurationSnapshot::new("8.10", "9.6", "x86_64"),
        }
    }

    #[tokio::test]
    async fn fresh_run_completes() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = registry(&counter);
        let workflow = workflow();
        let store = MemoryContextStore::new();
        let runner = WorkflowRunner::new(&workflow, &registry, &store);

        let result = runner
            .run(
                fresh(),
                &RunOptions::default(),
                &mut Answerfile::default(),
                &mut BTreeMap::<String, String>::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.outcome, RunOutcome::Completed);
        assert_eq!(result.state, ExecutionState::Completed);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(result.executed_actors(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn until_phase_stops_early() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = registry(&counter);
        let workflow = workflow();
        let store = MemoryContextStore::new();
        let runner = WorkflowRunner::new(&workflow, &registry, &store);
        let options = RunOptions {
            until_phase: Some("First".into()),
            ..RunOptions::default()
        };

        let result = runner
            .run(fresh(), &options, &mut Answerfile::default(), &mut BTreeMap::<String, String>::new())
            .await
            .unwrap();

        assert_eq!(
            result.outcome,
            RunOutcome::Stopped {
                phase: "First".into()
            }
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_until_phase_is_command_error() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = registry(&counter);
        let workflow = workflow();
        let store = MemoryContextStore::new();
        let runner = WorkflowRunner::new(&workflow, &registry, &store);
        let options = RunOptions {
            until_phase: Some("Nope".into()),
            ..RunOptions::default()
        };

        let err = runner
            .run(fresh(), &options, &mut Answerfile::default(), &mut BTreeMap::<String, String>::new())
            .await
            .unwrap_err();
        assert!(err.is_command_error());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn inhibitor_stops_and_keeps_phase_uncommitted() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = registry(&counter);
        registry
            .register(
                ActorDescriptor::builder("blocker")
                    .produces::<Report>()
                    .tag("TestWorkflow")
                    .tag("FirstPhase")
                    .build(Inhibit),
            )
            .unwrap();
        let workflow = workflow();
        let store = MemoryContextStore::new();
        let runner = WorkflowRunner::new(&workflow, &registry, &store);

        let result = runner
            .run(
                fresh(),
                &RunOptions::default(),
                &mut Answerfile::default(),
                &mut BTreeMap::<String, String>::new(),
            )
            .await
            .unwrap();

        assert!(matches!(result.outcome, RunOutcome::Inhibited { inhibitors: 1, .. }));
        assert!(result.failure());
        assert_eq!(result.inhibitors().len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let saved = store.load(&result.execution_id).unwrap().unwrap();
        assert!(saved.failure);
        assert_eq!(saved.last_completed_phase, None);
        assert!(store.load_journal(&result.execution_id).unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn failing_store_aborts_before_any_actor() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = registry(&counter);
        let workflow = workflow();

        let mut store = MockContextStore::new();
        store
            .expect_save()
            .times(1)
            .returning(|_| Err(PersistenceError::Unavailable("disk full".into())));
        store.expect_save_journal().never();

        let runner = WorkflowRunner::new(&workflow, &registry, &store);
        let err = runner
            .run(
                fresh(),
                &RunOptions::default(),
                &mut Answerfile::default(),
                &mut BTreeMap::<String, String>::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Persistence(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn corrupt_store_fails_resume_loudly() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = registry(&counter);
        let workflow = workflow();

        let mut store = MockContextStore::new();
        store.expect_most_recent().returning(|_| {
            Err(PersistenceError::Corrupt {
                path: "context.json".into(),
                message: "expected value".into(),
            })
        });

        let runner = WorkflowRunner::new(&workflow, &registry, &store);
        let err = runner
            .run(
                RunRequest::Resume {
                    kind: ExecutionKind::Upgrade,
                    id: None,
                },
                &RunOptions::default(),
                &mut Answerfile::default(),
                &mut BTreeMap::<String, String>::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Persistence(PersistenceError::Corrupt { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
