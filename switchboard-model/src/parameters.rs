//! Named parameter bag passed to commands.

use crate::RpcError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat, JSON-backed set of named arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build from a decoded argument value.
    ///
    /// `None` and `null` give an empty bag; anything but an object is rejected.
    pub fn from_value(value: Option<Value>) -> Result<Self, RpcError> {
        match value {
            None | Some(Value::Null) => Ok(Self::new()),
            Some(Value::Object(map)) => Ok(Self(map)),
            Some(other) => Err(RpcError::invocation(
                None,
                "INVALID_ARGS",
                format!("Arguments must be a JSON object, got {}", kind_of(&other)),
            )),
        }
    }

    pub fn from_tuples<V: Into<Value>>(pairs: impl IntoIterator<Item = (&'static str, V)>) -> Self {
        Self(pairs.into_iter().map(|(k, v)| (k.to_string(), v.into())).collect())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_as_string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn get_as_integer(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_as_boolean(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            Value::Number(n) => n.as_i64().map(|i| i != 0),
            _ => None,
        }
    }

    /// Deserialize a single parameter into a typed value.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_accepts_objects_and_nothing() {
        let params = Parameters::from_value(Some(json!({"id": "1", "n": 3}))).unwrap();
        assert_eq!(params.get_as_string("id").as_deref(), Some("1"));
        assert_eq!(params.get_as_integer("n"), Some(3));

        assert!(Parameters::from_value(None).unwrap().is_empty());
        assert!(Parameters::from_value(Some(Value::Null)).unwrap().is_empty());
    }

    #[test]
    fn test_from_value_rejects_scalars() {
        let err = Parameters::from_value(Some(json!([1, 2]))).unwrap_err();
        assert_eq!(err.code, "INVALID_ARGS");
    }

    #[test]
    fn test_loose_getters() {
        let params = Parameters::from_tuples([("flag", json!("yes")), ("count", json!("12"))]);
        assert_eq!(params.get_as_boolean("flag"), Some(true));
        assert_eq!(params.get_as_integer("count"), Some(12));
        assert_eq!(params.get_as::<String>("count").as_deref(), Some("12"));
        assert!(params.get_as_string("missing").is_none());
    }
}
