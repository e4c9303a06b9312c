//! Argument validation for tool calls.
//!
//! Schemas are plain JSON Schema (Draft 2020-12). They are compiled once when a
//! tool is built, and every call runs through [`ParameterSchema::validate`],
//! which fills in declared defaults first and then checks the result.

use std::fmt;
use std::sync::Arc;

use jsonschema::{Draft, Validator};
use serde_json::{json, Map, Value};

#[derive(Clone)]
pub struct ParameterSchema {
    raw: Value,
    validator: Arc<Validator>,
}

impl ParameterSchema {
    /// Compiles `raw`. The error string is the compiler's own message.
    pub fn compile(raw: Value) -> Result<Self, String> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&raw)
            .map_err(|err| err.to_string())?;
        Ok(Self {
            raw,
            validator: Arc::new(validator),
        })
    }

    /// Accepts any object. Used by tools that take no arguments.
    pub fn any_object() -> Self {
        // A literal schema always compiles.
        Self::compile(json!({ "type": "object" })).unwrap_or_else(|_| unreachable!())
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Applies defaults, then validates.
    ///
    /// Returns the completed arguments, or every violation found.
    pub fn validate(&self, mut args: Value) -> Result<Value, Vec<String>> {
        apply_defaults(&self.raw, &mut args);

        let violations: Vec<String> = self
            .validator
            .iter_errors(&args)
            .map(|err| err.to_string())
            .collect();

        if violations.is_empty() {
            Ok(args)
        } else {
            Err(violations)
        }
    }
}

impl fmt::Debug for ParameterSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ParameterSchema").field(&self.raw).finish()
    }
}

fn describes_object(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("object") || schema.get("properties").is_some()
}

/// Fills missing properties from their `default`, recursing into nested objects.
fn apply_defaults(schema: &Value, value: &mut Value) {
    if value.is_null() && describes_object(schema) {
        *value = Value::Object(Map::new());
    }

    let (Some(properties), Some(object)) = (
        schema.get("properties").and_then(Value::as_object),
        value.as_object_mut(),
    ) else {
        return;
    };

    for (key, property) in properties {
        if !object.contains_key(key) {
            if let Some(default) = property.get("default") {
                object.insert(key.clone(), default.clone());
            }
        }
        if let Some(nested) = object.get_mut(key) {
            if nested.is_object() {
                apply_defaults(property, nested);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_schema() -> ParameterSchema {
        ParameterSchema::compile(json!({
            "type": "object",
            "required": ["title", "priority"],
            "additionalProperties": false,
            "properties": {
                "title": { "type": "string" },
                "priority": { "type": "string", "enum": ["low", "high"], "default": "low" },
                "meta": {
                    "type": "object",
                    "properties": {
                        "source": { "type": "string", "default": "dashboard" }
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn defaults_fill_required_fields_before_checking() {
        let args = task_schema().validate(json!({ "title": "ship it" })).unwrap();
        assert_eq!(args["priority"], "low");
    }

    #[test]
    fn defaults_reach_into_nested_objects() {
        let args = task_schema()
            .validate(json!({ "title": "ship it", "meta": {} }))
            .unwrap();
        assert_eq!(args["meta"]["source"], "dashboard");
    }

    #[test]
    fn missing_required_property_is_reported() {
        let violations = task_schema().validate(json!({})).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("title"), "{:?}", violations);
    }

    #[test]
    fn wrong_type_and_enum_violations() {
        let violations = task_schema()
            .validate(json!({ "title": 7, "priority": "purple" }))
            .unwrap_err();
        assert_eq!(violations.len(), 2, "{:?}", violations);
        assert!(violations.iter().any(|v| v.contains("purple")));
    }

    #[test]
    fn unexpected_property_is_rejected() {
        let violations = task_schema()
            .validate(json!({ "title": "x", "owner": "ada" }))
            .unwrap_err();
        assert!(violations.iter().any(|v| v.contains("owner")), "{:?}", violations);
    }

    #[test]
    fn null_arguments_count_as_empty_object() {
        let schema = ParameterSchema::any_object();
        assert_eq!(schema.validate(Value::Null).unwrap(), json!({}));
    }

    #[test]
    fn bad_schema_does_not_compile() {
        assert!(ParameterSchema::compile(json!({ "type": 12 })).is_err());
    }
}
