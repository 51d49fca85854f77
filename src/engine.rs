//! Rule evaluation engine
//!
//! The hot-swap machinery never evaluates rules itself. It hands resolved
//! descriptors to an [`EngineBuilder`] and keeps the [`RuleEngine`] it gets
//! back. The default builder compiles every message type to a Draft 7 JSON
//! Schema validator.

use std::collections::BTreeMap;
use std::fmt;

use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::descriptor::ResolvedDescriptors;
use crate::error::{Result, SchemaError};

/// A message instance to validate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Fully-qualified message type (e.g. "user.v1.User")
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(rename = "message")]
    pub body: Value,
}

impl Message {
    pub fn new(type_name: impl Into<String>, body: Value) -> Self {
        Self {
            type_name: type_name.into(),
            body,
        }
    }
}

/// One broken rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// JSON pointer to the offending field ("" for the message root)
    pub field: String,
    /// JSON pointer to the rule inside the compiled schema
    pub rule: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let field = if self.field.is_empty() { "/" } else { &self.field };
        write!(f, "{}: {}", field, self.message)
    }
}

/// Why a message did not validate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidateError {
    #[error("No schema installed")]
    NoSchema,

    #[error("Unknown message type '{type_name}' in schema {version}")]
    UnknownMessageType { type_name: String, version: String },

    #[error("{} violation(s) against schema {version}", violations.len())]
    Violations {
        version: String,
        violations: Vec<Violation>,
    },
}

/// A ready-to-use validator built from one descriptor set
pub trait RuleEngine: Send + Sync {
    /// Evaluate a message; the error's `version` fields are left empty for the caller to fill
    fn validate(&self, message: &Message) -> std::result::Result<(), ValidateError>;

    /// Message types this engine knows, ordered by name
    fn message_types(&self) -> Vec<String>;
}

/// Constructs engines from resolved descriptors
pub trait EngineBuilder: Send + Sync {
    fn build(&self, descriptors: &ResolvedDescriptors) -> Result<Box<dyn RuleEngine>>;
}

/// Default builder backed by the `jsonschema` crate
#[derive(Debug, Clone, Default)]
pub struct JsonSchemaEngineBuilder;

/// Compiled JSON Schema validators, one per message type
pub struct JsonSchemaEngine {
    validators: BTreeMap<String, JSONSchema>,
}

impl EngineBuilder for JsonSchemaEngineBuilder {
    fn build(&self, descriptors: &ResolvedDescriptors) -> Result<Box<dyn RuleEngine>> {
        let definitions: Map<String, Value> = descriptors
            .types()
            .map(|t| (t.full_name.clone(), t.schema.clone()))
            .collect();

        let mut validators = BTreeMap::new();
        for message in descriptors.messages() {
            let mut root = message.schema.as_object().cloned().ok_or_else(|| {
                SchemaError::Engine(format!("message '{}' schema is not an object", message.full_name))
            })?;
            root.insert("definitions".to_string(), Value::Object(definitions.clone()));
            let root = Value::Object(root);

            let compiled = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&root)
                .map_err(|e| SchemaError::Engine(format!("{}: {}", message.full_name, e)))?;
            validators.insert(message.full_name.clone(), compiled);
        }

        Ok(Box::new(JsonSchemaEngine { validators }))
    }
}

impl RuleEngine for JsonSchemaEngine {
    fn validate(&self, message: &Message) -> std::result::Result<(), ValidateError> {
        let validator = self
            .validators
            .get(&message.type_name)
            .ok_or_else(|| ValidateError::UnknownMessageType {
                type_name: message.type_name.clone(),
                version: String::new(),
            })?;

        if let Err(errors) = validator.validate(&message.body) {
            let violations = errors
                .map(|e| Violation {
                    field: e.instance_path.to_string(),
                    rule: e.schema_path.to_string(),
                    message: e.to_string(),
                })
                .collect();
            return Err(ValidateError::Violations {
                version: String::new(),
                violations,
            });
        }
        Ok(())
    }

    fn message_types(&self) -> Vec<String> {
        self.validators.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorSet;
    use serde_json::json;

    fn build(set: Value) -> Result<Box<dyn RuleEngine>> {
        let set: DescriptorSet = serde_json::from_value(set).unwrap();
        JsonSchemaEngineBuilder.build(&set.resolve()?)
    }

    fn plan_engine() -> Box<dyn RuleEngine> {
        build(json!({
            "files": [{
                "name": "billing/v1/plan.json",
                "package": "billing.v1",
                "extensions": [
                    { "name": "PlanName", "schema": { "enum": ["free", "pro", "enterprise"] } }
                ],
                "messages": [{
                    "name": "Subscription",
                    "schema": {
                        "type": "object",
                        "required": ["plan", "seats"],
                        "properties": {
                            "plan": { "$ref": "#/definitions/billing.v1.PlanName" },
                            "seats": { "type": "integer", "minimum": 1 }
                        }
                    }
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_message() {
        let engine = plan_engine();
        assert_eq!(engine.message_types(), vec!["billing.v1.Subscription"]);
        let msg = Message::new("billing.v1.Subscription", json!({ "plan": "pro", "seats": 3 }));
        assert!(engine.validate(&msg).is_ok());
    }

    #[test]
    fn test_violations_carry_field_paths() {
        let engine = plan_engine();
        let msg = Message::new("billing.v1.Subscription", json!({ "plan": "gold", "seats": 0 }));
        match engine.validate(&msg) {
            Err(ValidateError::Violations { violations, .. }) => {
                let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
                assert!(fields.contains(&"/plan"));
                assert!(fields.contains(&"/seats"));
            }
            other => panic!("Expected violations, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_message_type() {
        let engine = plan_engine();
        let msg = Message::new("billing.v1.Invoice", json!({}));
        assert!(matches!(
            engine.validate(&msg),
            Err(ValidateError::UnknownMessageType { .. })
        ));
    }

    #[test]
    fn test_invalid_rule_is_a_build_error() {
        let result = build(json!({
            "files": [{
                "name": "bad.json",
                "messages": [{ "name": "Bad", "schema": { "type": "object", "minProperties": "three" } }]
            }]
        }));
        assert_eq!(result.err().unwrap().kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_message_wire_shape() {
        let msg: Message = serde_json::from_value(json!({ "type": "a.B", "message": { "x": 1 } })).unwrap();
        assert_eq!(msg.type_name, "a.B");
        assert_eq!(msg.body["x"], 1);
    }
}
