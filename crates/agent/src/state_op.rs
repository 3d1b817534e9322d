//! Internal state mutations
//!
//! A [`StateOp`] describes a change to the owning agent's state. It is applied
//! by the applier inside the strategy layer and never handed to the runtime.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StateOp {
    /// Deep-merge `attrs` into state
    SetState { attrs: Map<String, Value> },
    /// Replace state wholesale
    ReplaceState { state: Map<String, Value> },
    /// Remove top-level keys
    DeleteKeys { keys: Vec<String> },
    /// Write `value` at `path`, creating intermediate maps
    SetPath { path: Vec<String>, value: Value },
    /// Remove the entry at `path` if present
    DeletePath { path: Vec<String> },
}

impl StateOp {
    pub fn set_state(attrs: Map<String, Value>) -> Self {
        StateOp::SetState { attrs }
    }

    pub fn replace_state(state: Map<String, Value>) -> Self {
        StateOp::ReplaceState { state }
    }

    pub fn delete_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StateOp::DeleteKeys {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn set_path<I, S>(path: I, value: impl Into<Value>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StateOp::SetPath {
            path: path.into_iter().map(Into::into).collect(),
            value: value.into(),
        }
    }

    pub fn delete_path<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StateOp::DeletePath {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// Apply to `state` in place
    pub fn apply_to(self, state: &mut Map<String, Value>) {
        match self {
            StateOp::SetState { attrs } => deep_merge(state, attrs),
            StateOp::ReplaceState { state: next } => *state = next,
            StateOp::DeleteKeys { keys } => {
                for key in keys {
                    state.remove(&key);
                }
            }
            StateOp::SetPath { path, value } => set_path(state, &path, value),
            StateOp::DeletePath { path } => delete_path(state, &path),
        }
    }
}

/// Merge `source` into `target`. Maps merge key-wise recursively; any other
/// value overwrites.
pub fn deep_merge(target: &mut Map<String, Value>, source: Map<String, Value>) {
    for (key, incoming) in source {
        match (target.get_mut(&key), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => deep_merge(existing, nested),
            (_, other) => {
                target.insert(key, other);
            }
        }
    }
}

fn set_path(state: &mut Map<String, Value>, path: &[String], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut cursor = state;
    for key in parents {
        let slot = cursor
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        cursor = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
    cursor.insert(last.clone(), value);
}

fn delete_path(state: &mut Map<String, Value>, path: &[String]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut cursor = state;
    for key in parents {
        cursor = match cursor.get_mut(key) {
            Some(Value::Object(map)) => map,
            _ => return,
        };
    }
    cursor.remove(last);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_deep_merge_nested() {
        let mut state = map(json!({"a": {"x": 1, "keep": true}, "b": 1}));
        deep_merge(&mut state, map(json!({"a": {"y": 2}, "b": {"z": 3}})));
        assert_eq!(
            Value::Object(state),
            json!({"a": {"x": 1, "y": 2, "keep": true}, "b": {"z": 3}})
        );
    }

    #[test]
    fn test_set_path_overwrites_scalar_intermediate() {
        let mut state = map(json!({"a": 5}));
        StateOp::set_path(["a", "b", "c"], 1).apply_to(&mut state);
        assert_eq!(Value::Object(state), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_empty_paths_are_noops() {
        let mut state = map(json!({"a": 1}));
        StateOp::set_path(Vec::<String>::new(), 2).apply_to(&mut state);
        StateOp::delete_path(Vec::<String>::new()).apply_to(&mut state);
        assert_eq!(Value::Object(state), json!({"a": 1}));
    }

    #[test]
    fn test_delete_path_through_scalar() {
        let mut state = map(json!({"a": 1}));
        StateOp::delete_path(["a", "b"]).apply_to(&mut state);
        assert_eq!(Value::Object(state), json!({"a": 1}));
    }

    #[test]
    fn test_serde_tagging() {
        let op = StateOp::delete_keys(["a"]);
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "delete_keys", "keys": ["a"]})
        );
    }
}
