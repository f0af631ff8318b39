//! Message bus
//!
//! An append-only, totally ordered log of [`Message`]s shared by all actors of
//! one execution. Actors never touch the bus directly: each invocation gets an
//! [`ActorContext`] that checks every read and write against the actor's
//! declared contract.
//!
//! # Invariants
//! - Messages are never mutated or removed once appended
//! - `sequence` is strictly increasing in append order
//! - A consumer sees exactly the messages of its consumed types that were
//!   appended before the consume call, in append order

mod context;

pub use context::{ActorContext, TypedMessages};

use crate::actor::ActorDescriptor;
use crate::error::ContractViolation;
use chrono::Utc;
use ipu_model::{Message, MessageType, Model, ModelRegistry, Report};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared message log of one execution
#[derive(Debug)]
pub struct MessageBus {
    models: Arc<ModelRegistry>,
    log: Mutex<Vec<Message>>,
}

impl MessageBus {
    /// Create an empty bus
    #[must_use]
    pub fn new(models: Arc<ModelRegistry>) -> Self {
        Self::with_messages(models, Vec::new())
    }

    /// Create a bus pre-populated with committed messages of earlier phases
    #[must_use]
    pub fn with_messages(models: Arc<ModelRegistry>, messages: Vec<Message>) -> Self {
        Self {
            models,
            log: Mutex::new(messages),
        }
    }

    /// Append a message on behalf of an actor
    ///
    /// The draft is validated against the actor's `produces` set and the
    /// registered schema, then stamped with producer, phase, sequence and
    /// time.
    ///
    /// # Errors
    /// Returns [`ContractViolation`] if the type is undeclared or the payload
    /// does not match the schema. Nothing is appended in that case.
    pub fn produce(
        &self,
        actor: &ActorDescriptor,
        phase: &str,
        mut message: Message,
    ) -> Result<u64, ContractViolation> {
        if !actor.may_produce(&message.msg_type) {
            return Err(ContractViolation::UndeclaredProduce {
                actor: actor.name().to_string(),
                message_type: message.msg_type.to_string(),
            });
        }
        self.models
            .validate(&message)
            .map_err(|source| ContractViolation::InvalidMessage {
                actor: actor.name().to_string(),
                source,
            })?;

        let mut log = self.log.lock();
        let sequence = log.last().map_or(0, |m| m.sequence) + 1;
        message.produced_by = actor.name().to_string();
        message.phase = phase.to_string();
        message.sequence = sequence;
        message.produced_at = Utc::now();
        log.push(message);
        drop(log);

        tracing::trace!(actor = actor.name(), phase, sequence, "message produced");
        Ok(sequence)
    }

    /// Read all messages of a type on behalf of an actor
    ///
    /// The returned iterator is a snapshot; messages appended afterwards are
    /// not part of it.
    ///
    /// # Errors
    /// Returns [`ContractViolation::UndeclaredConsume`] if the type is not in
    /// the actor's `consumes` set.
    pub fn consume(
        &self,
        actor: &ActorDescriptor,
        msg_type: &MessageType,
    ) -> Result<Consumed, ContractViolation> {
        if !actor.may_consume(msg_type) {
            return Err(ContractViolation::UndeclaredConsume {
                actor: actor.name().to_string(),
                message_type: msg_type.to_string(),
            });
        }
        Ok(Consumed {
            inner: self.messages_of(msg_type).into_iter(),
        })
    }

    /// Engine-side read of all messages of a type, without contract checks
    #[must_use]
    pub fn messages_of(&self, msg_type: &MessageType) -> Vec<Message> {
        self.log
            .lock()
            .iter()
            .filter(|m| m.is(msg_type))
            .cloned()
            .collect()
    }

    /// All reports on the bus, in production order
    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.messages_of(&Report::message_type())
            .iter()
            .filter_map(|m| match m.decode::<Report>() {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::warn!(sequence = m.sequence, error = %e, "undecodable report skipped");
                    None
                }
            })
            .collect()
    }

    /// Whether any inhibitor report is on the bus
    #[must_use]
    pub fn has_inhibitors(&self) -> bool {
        self.reports().iter().any(Report::is_inhibitor)
    }

    /// Copy of the full log
    #[must_use]
    pub fn snapshot(&self) -> Vec<Message> {
        self.log.lock().clone()
    }

    /// Copy of the first `len` messages
    #[must_use]
    pub fn prefix(&self, len: usize) -> Vec<Message> {
        let log = self.log.lock();
        log[..len.min(log.len())].to_vec()
    }

    /// Number of messages on the bus
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Check if bus is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }
}

/// Snapshot of consumed messages
///
/// Iterating drains the snapshot; consume again for a fresh one.
#[derive(Debug)]
pub struct Consumed {
    inner: std::vec::IntoIter<Message>,
}

impl Iterator for Consumed {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Consumed {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorStop};
    use ipu_model::Topic;
    use serde_json::json;

    struct Noop;

    #[async_trait::async_trait]
    impl Actor for Noop {
        async fn process(&self, _ctx: &mut ActorContext<'_>) -> Result<(), ActorStop> {
            Ok(())
        }
    }

    fn reporter() -> ActorDescriptor {
        ActorDescriptor::builder("reporter")
            .produces::<Report>()
            .build(Noop)
    }

    fn reader() -> ActorDescriptor {
        ActorDescriptor::builder("reader")
            .consumes::<Report>()
            .build(Noop)
    }

    fn bus() -> MessageBus {
        MessageBus::new(Arc::new(ModelRegistry::with_builtins()))
    }

    #[test]
    fn produce_stamps_message() {
        let bus = bus();
        let draft = Message::from_model(&Report::new("t", "s")).unwrap();
        let seq = bus.produce(&reporter(), "Facts", draft).unwrap();
        assert_eq!(seq, 1);

        let log = bus.snapshot();
        assert_eq!(log[0].produced_by, "reporter");
        assert_eq!(log[0].phase, "Facts");
        assert_eq!(log[0].sequence, 1);
    }

    #[test]
    fn sequences_increase_across_restored_log() {
        let first = bus();
        let draft = Message::from_model(&Report::new("a", "b")).unwrap();
        first.produce(&reporter(), "Facts", draft).unwrap();

        let second = MessageBus::with_messages(
            Arc::new(ModelRegistry::with_builtins()),
            first.snapshot(),
        );
        let draft = Message::from_model(&Report::new("c", "d")).unwrap();
        assert_eq!(second.produce(&reporter(), "Checks", draft).unwrap(), 2);
    }

    #[test]
    fn undeclared_produce_rejected() {
        let bus = bus();
        let draft = Message::from_model(&Report::new("t", "s")).unwrap();
        let err = bus.produce(&reader(), "Facts", draft).unwrap_err();
        assert!(matches!(err, ContractViolation::UndeclaredProduce { .. }));
        assert!(bus.is_empty());
    }

    #[test]
    fn invalid_payload_rejected() {
        let bus = bus();
        let draft = Message::new(
            Report::message_type(),
            Topic::new(Report::TOPIC),
            json!({"title": "t"}),
        );
        let err = bus.produce(&reporter(), "Facts", draft).unwrap_err();
        assert!(matches!(err, ContractViolation::InvalidMessage { .. }));
        assert!(bus.is_empty());
    }

    #[test]
    fn undeclared_consume_rejected() {
        let bus = bus();
        let err = bus.consume(&reporter(), &Report::message_type()).unwrap_err();
        assert!(matches!(err, ContractViolation::UndeclaredConsume { .. }));
    }

    #[test]
    fn consume_returns_snapshot_in_order() {
        let bus = bus();
        for title in ["one", "two"] {
            let draft = Message::from_model(&Report::new(title, "s")).unwrap();
            bus.produce(&reporter(), "Facts", draft).unwrap();
        }

        let seen = bus.consume(&reader(), &Report::message_type()).unwrap();
        assert_eq!(seen.len(), 2);

        let draft = Message::from_model(&Report::new("three", "s")).unwrap();
        bus.produce(&reporter(), "Facts", draft).unwrap();

        let titles: Vec<String> = seen
            .map(|m| m.decode::<Report>().unwrap().title)
            .collect();
        assert_eq!(titles, vec!["one", "two"]);
    }

    #[test]
    fn inhibitor_detection() {
        let bus = bus();
        assert!(!bus.has_inhibitors());
        let draft = Message::from_model(&Report::inhibitor("stop", "now")).unwrap();
        bus.produce(&reporter(), "Checks", draft).unwrap();
        assert!(bus.has_inhibitors());
        assert_eq!(bus.prefix(0).len(), 0);
        assert_eq!(bus.prefix(10).len(), 1);
    }
}
