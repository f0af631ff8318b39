//! Model schemas
//!
//! A schema is pure data: a message type name, its topic and its declared
//! fields. The only behaviour is payload validation.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// JSON kind a field must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    List,
    Map,
    Any,
}

impl FieldKind {
    /// Whether `value` satisfies this kind
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Integer => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Boolean => value.is_boolean(),
            FieldKind::List => value.is_array(),
            FieldKind::Map => value.is_object(),
            FieldKind::Any => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::Boolean => "boolean",
            FieldKind::List => "list",
            FieldKind::Map => "map",
            FieldKind::Any => "any",
        };
        f.write_str(name)
    }
}

/// A declared field of a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl Field {
    /// Field that must be present and non-null
    #[inline]
    #[must_use]
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    /// Field that may be absent or null
    #[inline]
    #[must_use]
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Declared shape of one message type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    pub topic: String,
    pub fields: Vec<Field>,
}

impl ModelSchema {
    /// Create a schema
    #[must_use]
    pub fn new(name: impl Into<String>, topic: impl Into<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            fields,
        }
    }

    /// Validate a payload against the declared fields
    ///
    /// Undeclared keys are tolerated; declared keys must have the declared
    /// kind and required keys must be present and non-null.
    ///
    /// # Errors
    /// Returns the first violation found, in field declaration order.
    pub fn validate(&self, payload: &Value) -> Result<(), ModelError> {
        let object = payload.as_object().ok_or_else(|| ModelError::NotAnObject {
            model: self.name.clone(),
        })?;

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    return Err(ModelError::MissingField {
                        model: self.name.clone(),
                        field: field.name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) if !field.kind.accepts(value) => {
                    return Err(ModelError::WrongKind {
                        model: self.name.clone(),
                        field: field.name.clone(),
                        expected: field.kind.to_string(),
                        actual: kind_of(value).to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn os_info_schema() -> ModelSchema {
        ModelSchema::new(
            "OSInfo",
            "SystemInfoTopic",
            vec![
                Field::required("version", FieldKind::String),
                Field::optional("kernel_args", FieldKind::List),
            ],
        )
    }

    #[test]
    fn accepts_matching_payload() {
        let schema = os_info_schema();
        assert!(schema.validate(&json!({"version": "8.10"})).is_ok());
        assert!(schema
            .validate(&json!({"version": "8.10", "kernel_args": ["quiet"], "extra": 1}))
            .is_ok());
    }

    #[test]
    fn rejects_missing_required_field() {
        let err = os_info_schema().validate(&json!({})).unwrap_err();
        assert!(matches!(err, ModelError::MissingField { ref field, .. } if field == "version"));
    }

    #[test]
    fn null_required_field_counts_as_missing() {
        let err = os_info_schema()
            .validate(&json!({"version": null}))
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingField { .. }));
    }

    #[test]
    fn rejects_wrong_kind() {
        let err = os_info_schema()
            .validate(&json!({"version": 8}))
            .unwrap_err();
        assert_eq!(
            err,
            ModelError::WrongKind {
                model: "OSInfo".into(),
                field: "version".into(),
                expected: "string".into(),
                actual: "integer".into(),
            }
        );
    }

    #[test]
    fn rejects_non_object_payload() {
        assert!(matches!(
            os_info_schema().validate(&json!(["8.10"])),
            Err(ModelError::NotAnObject { .. })
        ));
    }

    #[test]
    fn float_kind_accepts_integers() {
        assert!(FieldKind::Float.accepts(&json!(3)));
        assert!(!FieldKind::Integer.accepts(&json!(3.5)));
    }
}
