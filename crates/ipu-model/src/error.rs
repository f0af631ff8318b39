//! Errors raised while declaring, encoding or validating models

/// Model registry and payload validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Message type was never registered
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Two schemas registered under the same name with different definitions
    #[error("conflicting schema for message type: {0}")]
    ConflictingSchema(String),

    /// Payload is not a JSON object
    #[error("payload of {model} must be an object")]
    NotAnObject { model: String },

    /// Required field missing from the payload
    #[error("{model}: missing required field '{field}'")]
    MissingField { model: String, field: String },

    /// Field present with the wrong JSON kind
    #[error("{model}: field '{field}' expected {expected}, got {actual}")]
    WrongKind {
        model: String,
        field: String,
        expected: String,
        actual: String,
    },

    /// Message topic differs from the registered schema topic
    #[error("{model}: topic '{actual}' does not match registered topic '{expected}'")]
    TopicMismatch {
        model: String,
        expected: String,
        actual: String,
    },

    /// Serde encode/decode failure
    #[error("{model}: serialization failed: {message}")]
    Serialization { model: String, message: String },
}

impl ModelError {
    /// Wrap a serde error for the given model name
    pub fn serialization(model: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::Serialization {
            model: model.into(),
            message: err.to_string(),
        }
    }
}
