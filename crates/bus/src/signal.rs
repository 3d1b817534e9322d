//! CloudEvents-shaped signal envelope

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

pub const SPEC_VERSION: &str = "1.0.2";

/// A typed event travelling between agents and the outside world
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub signal_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(default = "default_spec_version")]
    pub specversion: String,
    #[serde(default = "default_content_type")]
    pub datacontenttype: String,
    #[serde(default)]
    pub data: Value,
    /// Extension attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extensions: HashMap<String, Value>,
}

fn default_spec_version() -> String {
    SPEC_VERSION.to_string()
}

fn default_content_type() -> String {
    "application/json".to_string()
}

impl Signal {
    /// Create a signal with a fresh id and the current timestamp
    pub fn new(signal_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            signal_type: signal_type.into(),
            subject: None,
            time: Utc::now(),
            specversion: default_spec_version(),
            datacontenttype: default_content_type(),
            data: Value::Null,
            extensions: HashMap::new(),
        }
    }

    /// Attach a payload. Values that fail to serialize leave the data untouched.
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(data) {
            self.data = value;
        }
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.extensions.insert(key.into(), value);
        }
        self
    }

    /// JSON wire form
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
