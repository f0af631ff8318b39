//! Messages produced onto the bus

use crate::error::ModelError;
use crate::model::Model;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Message type name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageType(String);

impl MessageType {
    /// Create a message type from its name
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Type name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Topic grouping related message types
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Create a topic from its name
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Topic name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable record on the message bus
///
/// Drafts are created with [`Message::new`] or [`Message::from_model`]; the bus
/// stamps `produced_by`, `phase`, `sequence` and `produced_at` when the
/// message is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub topic: Topic,
    pub payload: Value,
    pub produced_by: String,
    pub phase: String,
    pub sequence: u64,
    pub produced_at: DateTime<Utc>,
}

impl Message {
    /// Create an unstamped message draft
    #[must_use]
    pub fn new(msg_type: MessageType, topic: Topic, payload: Value) -> Self {
        Self {
            msg_type,
            topic,
            payload,
            produced_by: String::new(),
            phase: String::new(),
            sequence: 0,
            produced_at: Utc::now(),
        }
    }

    /// Create a draft from a typed model
    ///
    /// # Errors
    /// Returns [`ModelError::Serialization`] when the model cannot be encoded.
    pub fn from_model<M: Model>(model: &M) -> Result<Self, ModelError> {
        Ok(Self::new(
            M::message_type(),
            Topic::new(M::TOPIC),
            model.to_payload()?,
        ))
    }

    /// Decode the payload as a typed model
    ///
    /// # Errors
    /// Returns [`ModelError::UnknownType`] if the message is of another type,
    /// or [`ModelError::Serialization`] if decoding fails.
    pub fn decode<M: Model>(&self) -> Result<M, ModelError> {
        if self.msg_type.as_str() != M::NAME {
            return Err(ModelError::UnknownType(format!(
                "expected {}, found {}",
                M::NAME,
                self.msg_type
            )));
        }
        M::from_payload(&self.payload)
    }

    /// Whether this message is of the given type
    #[inline]
    #[must_use]
    pub fn is(&self, msg_type: &MessageType) -> bool {
        &self.msg_type == msg_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldKind};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    impl Model for Ping {
        const NAME: &'static str = "Ping";
        const TOPIC: &'static str = "TestTopic";

        fn fields() -> Vec<Field> {
            vec![Field::required("seq", FieldKind::Integer)]
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Pong {}

    impl Model for Pong {
        const NAME: &'static str = "Pong";
        const TOPIC: &'static str = "TestTopic";

        fn fields() -> Vec<Field> {
            Vec::new()
        }
    }

    #[test]
    fn from_model_then_decode() {
        let msg = Message::from_model(&Ping { seq: 7 }).unwrap();
        assert_eq!(msg.msg_type.as_str(), "Ping");
        assert_eq!(msg.topic.as_str(), "TestTopic");
        assert_eq!(msg.decode::<Ping>().unwrap(), Ping { seq: 7 });
    }

    #[test]
    fn decode_as_other_model_fails() {
        let msg = Message::from_model(&Ping { seq: 1 }).unwrap();
        assert!(matches!(msg.decode::<Pong>(), Err(ModelError::UnknownType(_))));
    }

    #[test]
    fn type_field_serializes_as_type() {
        let msg = Message::from_model(&Ping { seq: 1 }).unwrap();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "Ping");
    }
}
