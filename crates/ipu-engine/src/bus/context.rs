//! Per-invocation actor context

use super::{Consumed, MessageBus};
use crate::actor::ActorDescriptor;
use crate::answerfile::Answerfile;
use crate::context::{ConfigurationSnapshot, ExecutionContext, ExecutionId, ExecutionKind};
use crate::error::ContractViolation;
use ipu_model::{Message, MessageType, Model, Report};
use std::marker::PhantomData;

/// The actor's view of the execution
///
/// Bound to one actor descriptor and one phase. All bus access goes through
/// here and is checked against the descriptor.
pub struct ActorContext<'a> {
    descriptor: &'a ActorDescriptor,
    phase: &'a str,
    bus: &'a MessageBus,
    execution: &'a ExecutionContext,
    answers: &'a mut Answerfile,
}

impl<'a> ActorContext<'a> {
    /// Create a context for one actor invocation
    #[must_use]
    pub fn new(
        descriptor: &'a ActorDescriptor,
        phase: &'a str,
        bus: &'a MessageBus,
        execution: &'a ExecutionContext,
        answers: &'a mut Answerfile,
    ) -> Self {
        Self {
            descriptor,
            phase,
            bus,
            execution,
            answers,
        }
    }

    /// Name of the running actor
    #[inline]
    #[must_use]
    pub fn actor_name(&self) -> &str {
        self.descriptor.name()
    }

    /// Name of the current phase
    #[inline]
    #[must_use]
    pub fn phase(&self) -> &str {
        self.phase
    }

    /// Id of the current execution
    #[inline]
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution.id
    }

    /// Kind of the current execution
    #[inline]
    #[must_use]
    pub fn execution_kind(&self) -> ExecutionKind {
        self.execution.kind
    }

    /// Configuration captured at the start of the run
    #[inline]
    #[must_use]
    pub fn configuration(&self) -> &ConfigurationSnapshot {
        &self.execution.configuration
    }

    /// Captured `IPU_*` environment variable
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.execution.configuration.env.get(key).map(String::as_str)
    }

    /// Produce a typed model
    ///
    /// # Errors
    /// Returns [`ContractViolation`] on an undeclared type or invalid payload.
    pub fn produce<M: Model>(&self, model: &M) -> Result<(), ContractViolation> {
        let message = Message::from_model(model).map_err(|source| {
            ContractViolation::InvalidMessage {
                actor: self.descriptor.name().to_string(),
                source,
            }
        })?;
        self.produce_message(message)
    }

    /// Produce a message draft
    ///
    /// # Errors
    /// Returns [`ContractViolation`] on an undeclared type or invalid payload.
    pub fn produce_message(&self, message: Message) -> Result<(), ContractViolation> {
        self.bus
            .produce(self.descriptor, self.phase, message)
            .map(|_| ())
    }

    /// Produce a report
    ///
    /// # Errors
    /// Returns [`ContractViolation`] unless the actor declares `Report`.
    pub fn report(&self, report: &Report) -> Result<(), ContractViolation> {
        self.produce(report)
    }

    /// Consume all messages of a model, decoded lazily
    ///
    /// # Errors
    /// Returns [`ContractViolation::UndeclaredConsume`] for undeclared types.
    pub fn consume<M: Model>(&self) -> Result<TypedMessages<M>, ContractViolation> {
        Ok(TypedMessages {
            actor: self.descriptor.name().to_string(),
            inner: self.consume_type(&M::message_type())?,
            _model: PhantomData,
        })
    }

    /// Consume raw messages of a type
    ///
    /// # Errors
    /// Returns [`ContractViolation::UndeclaredConsume`] for undeclared types.
    pub fn consume_type(&self, msg_type: &MessageType) -> Result<Consumed, ContractViolation> {
        self.bus.consume(self.descriptor, msg_type)
    }

    /// Consume the first message of a model
    ///
    /// More than one available message is logged and all but the first are
    /// ignored.
    ///
    /// # Errors
    /// Returns [`ContractViolation`] for undeclared types or undecodable
    /// payloads.
    pub fn consume_one<M: Model>(&self) -> Result<Option<M>, ContractViolation> {
        let mut messages = self.consume::<M>()?;
        if messages.len() > 1 {
            tracing::warn!(
                actor = self.descriptor.name(),
                model = M::NAME,
                count = messages.len(),
                "expected one message, using the first"
            );
        }
        messages.next().transpose()
    }

    /// Recorded answer for a dialog question
    #[must_use]
    pub fn answer(&self, section: &str, key: &str) -> Option<&toml::Value> {
        self.answers.get(section, key)
    }

    /// Record an answer so that later runs see it
    pub fn record_answer(&mut self, section: &str, key: &str, value: impl Into<toml::Value>) {
        self.answers.set(section, key, value.into());
    }
}

/// Lazily decoded consumed messages
pub struct TypedMessages<M> {
    actor: String,
    inner: Consumed,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Iterator for TypedMessages<M> {
    type Item = Result<M, ContractViolation>;

    fn next(&mut self) -> Option<Self::Item> {
        let message = self.inner.next()?;
        Some(
            message
                .decode::<M>()
                .map_err(|source| ContractViolation::InvalidMessage {
                    actor: self.actor.clone(),
                    source,
                }),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<M: Model> ExactSizeIterator for TypedMessages<M> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorStop};
    use crate::context::ConfigurationSnapshot;
    use ipu_model::ModelRegistry;
    use std::sync::Arc;

    struct Noop;

    #[async_trait::async_trait]
    impl Actor for Noop {
        async fn process(&self, _ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
            Ok(())
        }
    }

    fn execution() -> ExecutionContext {
        let mut config = ConfigurationSnapshot::new("8.10", "9.6", "x86_64");
        config.env.insert("IPU_NO_RHSM".into(), "1".into());
        ExecutionContext::new(ExecutionKind::Upgrade, "IPUWorkflow", config)
    }

    #[test]
    fn produce_then_consume_round_trip() {
        let bus = MessageBus::new(Arc::new(ModelRegistry::with_builtins()));
        let exec = execution();
        let mut answers = Answerfile::default();

        let writer = ActorDescriptor::builder("writer")
            .produces::<Report>()
            .build(Noop);
        let ctx = ActorContext::new(&writer, "Checks", &bus, &exec, &mut answers);
        ctx.report(&Report::inhibitor("a", "b")).unwrap();
        drop(ctx);

        let reader = ActorDescriptor::builder("reader")
            .consumes::<Report>()
            .build(Noop);
        let ctx = ActorContext::new(&reader, "Checks", &bus, &exec, &mut answers);
        let report = ctx.consume_one::<Report>().unwrap().unwrap();
        assert!(report.is_inhibitor());
        assert_eq!(ctx.env("IPU_NO_RHSM"), Some("1"));
        assert_eq!(ctx.phase(), "Checks");
    }

    #[test]
    fn consume_one_on_empty_bus_is_none() {
        let bus = MessageBus::new(Arc::new(ModelRegistry::with_builtins()));
        let exec = execution();
        let mut answers = Answerfile::default();
        let reader = ActorDescriptor::builder("reader")
            .consumes::<Report>()
            .build(Noop);
        let ctx = ActorContext::new(&reader, "Facts", &bus, &exec, &mut answers);
        assert!(ctx.consume_one::<Report>().unwrap().is_none());
    }

    #[test]
    fn answers_are_recorded() {
        let bus = MessageBus::new(Arc::new(ModelRegistry::with_builtins()));
        let exec = execution();
        let mut answers = Answerfile::default();
        let actor = ActorDescriptor::builder("asker").build(Noop);

        let mut ctx = ActorContext::new(&actor, "Checks", &bus, &exec, &mut answers);
        assert!(ctx.answer("remove_pam_pkcs11", "confirm").is_none());
        ctx.record_answer("remove_pam_pkcs11", "confirm", true);
        drop(ctx);

        assert_eq!(
            answers.get("remove_pam_pkcs11", "confirm"),
            Some(&toml::Value::Boolean(true))
        );
    }
}
