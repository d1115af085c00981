use crate::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Value object: the key/value execution context threaded through routing
/// and assignment policies and through business predicates.
///
/// Read-only once constructed: a policy that needs different variables asks
/// the aggregate for a replacement built with [`ProcessVariables::with`] /
/// [`ProcessVariables::without`]. Backed by a `BTreeMap` so the JSON
/// encoding at the persistence boundary is order-independent and stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessVariables {
    variables: BTreeMap<String, Value>,
}

impl ProcessVariables {
    /// Well-known key: the user that started the process
    pub const INITIATOR_ID: &'static str = "initiatorId";

    /// Well-known key: approvers chosen by the initiator
    pub const APPROVER_IDS: &'static str = "approverIds";

    /// Create an empty variable set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from existing key/value pairs
    pub fn from_iter<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            variables: entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Parse from a JSON object string. An empty string yields an empty set.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let variables: BTreeMap<String, Value> = serde_json::from_str(json)
            .map_err(|e| CoreError::SerializationError(format!("invalid process variables: {}", e)))?;
        Ok(Self { variables })
    }

    /// Encode as a JSON object string
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(&self.variables)?)
    }

    /// Read a variable
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Read a variable as a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.variables.get(key).and_then(Value::as_str)
    }

    /// Read a variable as an integer, coercing a numeric string if needed.
    /// Identity comparisons (e.g. the initiator check) rely on this
    /// coercion so `42` and `"42"` mean the same user.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.variables.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Read a variable as a boolean, coercing the strings "true"/"false"
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.variables.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether the variable exists
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    /// Produce a new variable set with `key` set to `value`
    pub fn with(&self, key: &str, value: Value) -> Self {
        let mut variables = self.variables.clone();
        variables.insert(key.to_string(), value);
        Self { variables }
    }

    /// Produce a new variable set without `key`
    pub fn without(&self, key: &str) -> Self {
        let mut variables = self.variables.clone();
        variables.remove(key);
        Self { variables }
    }

    /// Whether the set is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Number of variables
    #[inline]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Iterate over all variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }
}
