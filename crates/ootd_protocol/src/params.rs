//! Query parameters driving a store's fetch.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys owned by the pagination machinery. Callers may not set them.
pub const RESERVED_PARAM_KEYS: [&str; 2] = ["cursor", "idAfter"];

/// An immutable, serializable query descriptor (filters, sort, limit).
///
/// `Params` is a flat JSON object. Merging a patch overwrites keys; a `null`
/// value in the patch removes the key, which is how a filter is cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    /// Creates empty params.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builds params from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> ProtocolResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            _ => Err(ProtocolError::NotAnObject("params")),
        }
    }

    /// Sets a key, returning the updated params.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the value for `key` if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Returns the page size, if one was set.
    pub fn limit(&self) -> Option<u64> {
        self.0.get("limit").and_then(Value::as_u64)
    }

    /// Returns true if no keys are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the keys and values.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns a new `Params` with `patch` shallow-merged over `self`.
    pub fn merged(&self, patch: &Params) -> Params {
        let mut merged = self.0.clone();
        for (key, value) in &patch.0 {
            if value.is_null() {
                merged.remove(key);
            } else {
                merged.insert(key.clone(), value.clone());
            }
        }
        Params(merged)
    }

    /// Rejects params that must never reach the network.
    ///
    /// Reserved cursor keys are owned by the store; `limit` must be a
    /// positive integer; nested objects are not representable in a query
    /// string.
    pub fn validate(&self) -> ProtocolResult<()> {
        for key in RESERVED_PARAM_KEYS {
            if self.0.contains_key(key) {
                return Err(ProtocolError::InvalidParams(format!(
                    "`{key}` is managed by the store"
                )));
            }
        }
        if let Some(limit) = self.0.get("limit") {
            match limit.as_u64() {
                Some(n) if n > 0 => {}
                _ => {
                    return Err(ProtocolError::InvalidParams(format!(
                        "`limit` must be a positive integer, got {limit}"
                    )))
                }
            }
        }
        for (key, value) in &self.0 {
            if value.is_object() {
                return Err(ProtocolError::InvalidParams(format!(
                    "`{key}` must be a scalar or a list"
                )));
            }
        }
        Ok(())
    }

    /// Flattens the params into query-string pairs.
    ///
    /// Strings are emitted unquoted, lists repeat the key, nulls are skipped.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.0.len());
        for (key, value) in &self.0 {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        if let Some(text) = scalar_text(item) {
                            pairs.push((key.clone(), text));
                        }
                    }
                }
                other => {
                    if let Some(text) = scalar_text(other) {
                        pairs.push((key.clone(), text));
                    }
                }
            }
        }
        pairs
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
