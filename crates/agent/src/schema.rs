//! Parameter schemas for actions
//!
//! Incoming params are matched against the declared field names only; an
//! undeclared key is a validation error. Values are then coerced to the
//! declared type, defaults are filled in and required fields are checked.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::{AgentError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Map,
    List,
    Any,
}

impl FieldType {
    /// Convert `value` to this type, if it has an unambiguous reading
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (FieldType::Any, value) => Some(value),

            (FieldType::String, Value::String(s)) => Some(Value::String(s)),
            (FieldType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (FieldType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),

            (FieldType::Integer, Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    Some(Value::Number(n))
                } else {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| Value::from(f as i64))
                }
            }
            (FieldType::Integer, Value::String(s)) => {
                s.trim().parse::<i64>().ok().map(Value::from)
            }

            (FieldType::Float, Value::Number(n)) => {
                n.as_f64().and_then(Number::from_f64).map(Value::Number)
            }
            (FieldType::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),

            (FieldType::Boolean, Value::Bool(b)) => Some(Value::Bool(b)),
            (FieldType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },

            (FieldType::Map, Value::Object(map)) => Some(Value::Object(map)),
            (FieldType::List, Value::Array(list)) => Some(Value::Array(list)),

            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Map => "map",
            FieldType::List => "list",
            FieldType::Any => "any",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            doc: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
}

/// Declared parameters of one action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    pub fields: Vec<FieldSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Resolve keys, coerce values, fill defaults and check required fields
    pub fn normalize(&self, action: &str, params: Map<String, Value>) -> Result<Map<String, Value>> {
        let mut normalized = Map::new();

        for (key, value) in params {
            let spec = self.get(&key).ok_or_else(|| AgentError::UnknownField {
                action: action.to_string(),
                field: key.clone(),
            })?;
            if value.is_null() {
                continue;
            }

            let coerced = spec
                .field_type
                .coerce(value.clone())
                .ok_or_else(|| AgentError::InvalidParam {
                    action: action.to_string(),
                    field: key.clone(),
                    reason: format!("expected {}, got {}", spec.field_type.name(), value),
                })?;
            normalized.insert(key, coerced);
        }

        for spec in &self.fields {
            if normalized.contains_key(&spec.name) {
                continue;
            }
            match &spec.default {
                Some(default) => {
                    normalized.insert(spec.name.clone(), default.clone());
                }
                None if spec.required => {
                    return Err(AgentError::MissingParam {
                        action: action.to_string(),
                        field: spec.name.clone(),
                    })
                }
                None => {}
            }
        }

        Ok(normalized)
    }
}
