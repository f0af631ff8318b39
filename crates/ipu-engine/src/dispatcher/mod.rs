//! Dispatcher
//!
//! Selects the actors of a phase and runs them one at a time.
//!
//! # Selection
//! An actor is eligible for a phase when it carries both the workflow tag and
//! the phase tag, passes the optional tag filter, and is either not
//! experimental or explicitly whitelisted. Eligible actors are ordered so
//! that every producer precedes every consumer of its types; independent
//! actors run in lexical name order.
//!
//! # Execution
//! Actors are awaited sequentially. After each actor the caller-supplied
//! verdict decides whether the phase continues.

mod graph;

use crate::actor::{ActorDescriptor, ActorRegistry, ActorStop};
use crate::answerfile::Answerfile;
use crate::audit::AuditLog;
use crate::bus::{ActorContext, MessageBus};
use crate::context::ExecutionContext;
use crate::error::{ContractViolation, DispatchError};
use crate::workflow::Phase;
use futures::FutureExt;
use graph::DependencyGraph;
use ipu_model::Tag;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// Operator-controlled selection filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchFilters {
    /// When set, only actors carrying at least one of these tags run
    pub only_with_tags: Option<BTreeSet<Tag>>,
    /// Experimental actors allowed to run
    pub whitelist_experimental: BTreeSet<String>,
}

impl DispatchFilters {
    /// Whether the actor passes the filters
    #[must_use]
    pub fn admits(&self, actor: &ActorDescriptor) -> bool {
        if actor.is_experimental() && !self.whitelist_experimental.contains(actor.name()) {
            return false;
        }
        match &self.only_with_tags {
            Some(tags) => tags.iter().any(|t| actor.has_tag(t)),
            None => true,
        }
    }
}

/// What happened to one actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorResult {
    /// Ran to completion
    Completed,
    /// Stopped itself recoverably
    Skipped {
        /// Reason given by the actor
        reason: String,
    },
    /// Stopped itself fatally
    Fatal {
        /// Reason given by the actor
        reason: String,
        /// Optional detail
        details: Option<String>,
    },
    /// Broke its message contract
    ContractViolation(ContractViolation),
    /// Failed with an unexpected error or panic
    Failed {
        /// Rendered error chain
        error: String,
    },
}

impl ActorResult {
    /// Short label for logs and metrics
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            ActorResult::Completed => "completed",
            ActorResult::Skipped { .. } => "skipped",
            ActorResult::Fatal { .. } => "fatal",
            ActorResult::ContractViolation(_) => "contract_violation",
            ActorResult::Failed { .. } => "failed",
        }
    }
}

impl From<ActorStop> for ActorResult {
    fn from(stop: ActorStop) -> Self {
        match stop {
            ActorStop::Recoverable { reason } => ActorResult::Skipped { reason },
            ActorStop::Fatal { reason, details } => ActorResult::Fatal { reason, details },
            ActorStop::Contract(violation) => ActorResult::ContractViolation(violation),
            ActorStop::Unexpected(error) => ActorResult::Failed {
                error: format!("{error:#}"),
            },
        }
    }
}

/// Result of one actor invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorOutcome {
    /// Actor name
    pub actor: String,
    /// What happened
    pub result: ActorResult,
    /// Wall time in milliseconds
    pub elapsed_ms: u64,
}

/// Whether dispatching continues after an actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run the next actor
    Continue,
    /// Stop the phase
    Stop,
}

/// Shared state an actor invocation runs against
pub struct RunScope<'a> {
    /// Message bus of the execution
    pub bus: &'a MessageBus,
    /// Execution context, read-only for actors
    pub execution: &'a ExecutionContext,
    /// Dialog answers
    pub answers: &'a mut Answerfile,
    /// Audit trail
    pub audit: &'a AuditLog,
}

/// Actor selector and sequential runner
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'r> {
    registry: &'r ActorRegistry,
}

impl<'r> Dispatcher<'r> {
    /// Create a dispatcher over a registry
    #[inline]
    #[must_use]
    pub fn new(registry: &'r ActorRegistry) -> Self {
        Self { registry }
    }

    /// Ordered actors to run in a phase
    ///
    /// Pure function of the registry, the phase, the workflow tag and the
    /// filters.
    ///
    /// # Errors
    /// Returns [`DispatchError::Cycle`] when eligible actors depend on each
    /// other circularly.
    pub fn select_for_phase(
        &self,
        phase: &Phase,
        workflow_tag: &Tag,
        filters: &DispatchFilters,
    ) -> Result<Vec<Arc<ActorDescriptor>>, DispatchError> {
        let candidates: Vec<Arc<ActorDescriptor>> = self
            .registry
            .iter()
            .filter(|a| a.has_tag(workflow_tag) && a.has_tag(phase.tag()))
            .filter(|a| filters.admits(a))
            .cloned()
            .collect();

        let graph = DependencyGraph::build(&candidates);
        let order = graph.ordered().map_err(|members| DispatchError::Cycle {
            phase: phase.name().to_string(),
            members,
        })?;

        let selected: Vec<Arc<ActorDescriptor>> =
            order.into_iter().map(|i| Arc::clone(&candidates[i])).collect();
        tracing::debug!(
            phase = phase.name(),
            actors = ?selected.iter().map(|a| a.name()).collect::<Vec<_>>(),
            "phase plan"
        );
        Ok(selected)
    }

    /// Run actors in order, consulting `verdict` after each one
    pub async fn run<F>(
        &self,
        phase: &Phase,
        actors: &[Arc<ActorDescriptor>],
        scope: &mut RunScope<'_>,
        mut verdict: F,
    ) -> Vec<ActorOutcome>
    where
        F: FnMut(&ActorOutcome) -> Flow + Send,
    {
        let mut outcomes = Vec::with_capacity(actors.len());

        for descriptor in actors {
            let outcome = run_actor(descriptor, phase, scope).await;

            metrics::counter!("ipu_actor_runs_total", "result" => outcome.result.label())
                .increment(1);
            if !matches!(
                outcome.result,
                ActorResult::Completed | ActorResult::Skipped { .. }
            ) {
                metrics::counter!("ipu_actor_failures_total", "actor" => outcome.actor.clone())
                    .increment(1);
            }

            let flow = verdict(&outcome);
            outcomes.push(outcome);
            if flow == Flow::Stop {
                tracing::warn!(phase = phase.name(), "phase stopped early");
                break;
            }
        }

        outcomes
    }
}

async fn run_actor(
    descriptor: &Arc<ActorDescriptor>,
    phase: &Phase,
    scope: &mut RunScope<'_>,
) -> ActorOutcome {
    let execution_id = scope.execution.id;
    scope.audit.record(
        execution_id,
        Some(phase.name()),
        Some(descriptor.name()),
        "actor_started",
        "",
    );
    tracing::info!(phase = phase.name(), actor = descriptor.name(), "running actor");

    let started = Instant::now();
    let behaviour = Arc::clone(descriptor.behaviour());
    let mut ctx = ActorContext::new(
        descriptor,
        phase.name(),
        scope.bus,
        scope.execution,
        &mut *scope.answers,
    );
    let result = match AssertUnwindSafe(behaviour.process(&mut ctx))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => ActorResult::Completed,
        Ok(Err(stop)) => ActorResult::from(stop),
        Err(panic) => ActorResult::Failed {
            error: panic_message(panic.as_ref()),
        },
    };
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match &result {
        ActorResult::Completed => {
            tracing::debug!(actor = descriptor.name(), elapsed_ms, "actor completed");
        }
        ActorResult::Skipped { reason } => {
            tracing::info!(actor = descriptor.name(), reason = %reason, "actor skipped");
        }
        other => {
            tracing::error!(actor = descriptor.name(), result = ?other, "actor failed");
        }
    }
    scope.audit.record(
        execution_id,
        Some(phase.name()),
        Some(descriptor.name()),
        "actor_finished",
        result.label(),
    );

    ActorOutcome {
        actor: descriptor.name().to_string(),
        result,
        elapsed_ms,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;
    use ipu_model::ModelRegistry;

    struct Noop;

    #[async_trait::async_trait]
    impl Actor for Noop {
        async fn process(&self, _ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
            Ok(())
        }
    }

    fn registry(actors: Vec<ActorDescriptor>) -> ActorRegistry {
        let mut registry = ActorRegistry::new(ModelRegistry::with_builtins());
        registry.register_all(actors).unwrap();
        registry
    }

    fn tagged(name: &str) -> ActorDescriptor {
        ActorDescriptor::builder(name)
            .tag("IPUWorkflow")
            .tag("ChecksPhase")
            .build(Noop)
    }

    fn names(actors: &[Arc<ActorDescriptor>]) -> Vec<&str> {
        actors.iter().map(|a| a.name()).collect()
    }

    #[test]
    fn selection_requires_both_tags() {
        let registry = registry(vec![
            tagged("both"),
            ActorDescriptor::builder("phase_only")
                .tag("ChecksPhase")
                .build(Noop),
            ActorDescriptor::builder("workflow_only")
                .tag("IPUWorkflow")
                .build(Noop),
        ]);
        let selected = Dispatcher::new(&registry)
            .select_for_phase(
                &Phase::new("Checks", "ChecksPhase"),
                &Tag::new("IPUWorkflow"),
                &DispatchFilters::default(),
            )
            .unwrap();
        assert_eq!(names(&selected), vec!["both"]);
    }

    #[test]
    fn experimental_needs_whitelist() {
        let experimental = ActorDescriptor::builder("beta")
            .tag("IPUWorkflow")
            .tag("ChecksPhase")
            .experimental()
            .build(Noop);
        let registry = registry(vec![tagged("alpha"), experimental, tagged("gamma")]);
        let dispatcher = Dispatcher::new(&registry);
        let phase = Phase::new("Checks", "ChecksPhase");
        let workflow = Tag::new("IPUWorkflow");

        let without = dispatcher
            .select_for_phase(&phase, &workflow, &DispatchFilters::default())
            .unwrap();
        assert_eq!(names(&without), vec!["alpha", "gamma"]);

        let filters = DispatchFilters {
            whitelist_experimental: BTreeSet::from(["beta".to_string()]),
            ..DispatchFilters::default()
        };
        let with = dispatcher.select_for_phase(&phase, &workflow, &filters).unwrap();
        assert_eq!(names(&with), vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn tag_filter_narrows_selection() {
        let kernel = ActorDescriptor::builder("kernel_check")
            .tag("IPUWorkflow")
            .tag("ChecksPhase")
            .tag("KernelTag")
            .build(Noop);
        let registry = registry(vec![tagged("other"), kernel]);
        let filters = DispatchFilters {
            only_with_tags: Some(BTreeSet::from([Tag::new("KernelTag")])),
            ..DispatchFilters::default()
        };
        let selected = Dispatcher::new(&registry)
            .select_for_phase(
                &Phase::new("Checks", "ChecksPhase"),
                &Tag::new("IPUWorkflow"),
                &filters,
            )
            .unwrap();
        assert_eq!(names(&selected), vec!["kernel_check"]);
    }

    #[test]
    fn stop_result_labels() {
        let result: ActorResult = ActorStop::recoverable("nope").into();
        assert_eq!(result.label(), "skipped");
        let result: ActorResult = ActorStop::Unexpected(anyhow::anyhow!("x")).into();
        assert_eq!(result, ActorResult::Failed { error: "x".into() });
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("bad state");
        assert_eq!(panic_message(payload.as_ref()), "panicked: bad state");
        let payload: Box<dyn std::any::Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "panicked");
    }
}
