//! Model trait
//!
//! Implement [`Model`] for every Rust type that actors exchange. The trait
//! supplies the static contract (type name, topic, declared fields) that the
//! registry and the bus check at run time.

use crate::error::ModelError;
use crate::message::MessageType;
use crate::schema::{Field, ModelSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A typed message model
///
/// # Contract
/// - `NAME` is unique across the registry
/// - `fields()` describes the serialized JSON object
/// - Serialization must produce a JSON object
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Unique message type name
    const NAME: &'static str;

    /// Topic the type belongs to
    const TOPIC: &'static str;

    /// Declared fields of the serialized payload
    fn fields() -> Vec<Field>;

    /// Message type of this model
    #[must_use]
    fn message_type() -> MessageType {
        MessageType::new(Self::NAME)
    }

    /// Full schema of this model
    #[must_use]
    fn schema() -> ModelSchema {
        ModelSchema::new(Self::NAME, Self::TOPIC, Self::fields())
    }

    /// Encode into a JSON payload
    ///
    /// # Errors
    /// Returns [`ModelError::Serialization`] when serde fails.
    fn to_payload(&self) -> Result<Value, ModelError> {
        serde_json::to_value(self).map_err(|e| ModelError::serialization(Self::NAME, &e))
    }

    /// Decode from a JSON payload
    ///
    /// # Errors
    /// Returns [`ModelError::Serialization`] when the payload does not match.
    fn from_payload(payload: &Value) -> Result<Self, ModelError> {
        Self::deserialize(payload).map_err(|e| ModelError::serialization(Self::NAME, &e))
    }
}
