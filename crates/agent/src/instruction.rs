//! The canonical unit of work

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::{AgentError, Result};

/// Name of an executable action
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionRef(String);

impl ActionRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Blank references never resolve
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ActionRef {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Ordered keyword list. Keys are unique; merging keeps first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Opts(Vec<(String, Value)>);

impl Opts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Override an existing key in place, or append a new one
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    /// Append `other` after `self`; on duplicate keys `other` wins
    pub fn merge(&mut self, other: &Opts) {
        for (key, value) in &other.0 {
            self.insert(key.clone(), value.clone());
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Accepts an object or a list of `[key, value]` pairs
    pub fn from_value(value: &Value) -> Result<Opts> {
        match value {
            Value::Null => Ok(Opts::new()),
            Value::Object(map) => Ok(map
                .iter()
                .fold(Opts::new(), |opts, (k, v)| opts.with(k.clone(), v.clone()))),
            Value::Array(pairs) => {
                let mut opts = Opts::new();
                for pair in pairs {
                    match pair.as_array().map(Vec::as_slice) {
                        Some([Value::String(key), value]) => opts.insert(key.clone(), value.clone()),
                        _ => {
                            return Err(AgentError::InvalidFormat(format!(
                                "opts entry must be a [key, value] pair, got {}",
                                pair
                            )))
                        }
                    }
                }
                Ok(opts)
            }
            other => Err(AgentError::InvalidFormat(format!(
                "opts must be a map or keyword list, got {}",
                other
            ))),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Opts {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut opts = Opts::new();
        for (key, value) in iter {
            opts.insert(key, value);
        }
        opts
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// An action reference plus parameters, context and options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(default = "new_id")]
    pub id: String,
    pub action: ActionRef,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub opts: Opts,
}

impl Instruction {
    /// Create an instruction with a fresh id. Fails on a blank action.
    pub fn new(action: impl Into<ActionRef>) -> Result<Self> {
        let action = action.into();
        if !action.is_valid() {
            return Err(AgentError::InvalidAction(action.to_string()));
        }

        Ok(Self {
            id: new_id(),
            action,
            params: Map::new(),
            context: Map::new(),
            opts: Opts::new(),
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_opts(mut self, opts: Opts) -> Self {
        self.opts = opts;
        self
    }
}
