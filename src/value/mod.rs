//! The value model shared by commands, events, snapshots and the case file.
//!
//! `Value` is a JSON-like tree with one extra leaf kind, `Binary`. It travels
//! through serde by way of `serde_json::Value`; binary leaves use the
//! single-key object `{"$binary": "<base64>"}` so the bridge stays lossless.

mod map;

pub use map::ValueMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Number;

const BINARY_KEY: &str = "$binary";

/// A variant value: null, primitive, binary, ordered map or list.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Binary(Vec<u8>),
    Map(ValueMap),
    List(Vec<Value>),
}

impl Value {
    /// Builds a value from anything serde can serialize.
    pub fn from_serde<T: Serialize + ?Sized>(item: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(item).map(Self::from_json)
    }

    /// Reads a typed item back out of the value.
    pub fn to_serde<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_json())
    }

    /// Converts from the JSON tree, recognising encoded binary leaves.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(object) => {
                if object.len() == 1 {
                    if let Some(serde_json::Value::String(encoded)) = object.get(BINARY_KEY) {
                        if let Ok(bytes) = BASE64.decode(encoded) {
                            return Value::Binary(bytes);
                        }
                    }
                }
                Value::Map(
                    object
                        .into_iter()
                        .map(|(k, v)| (k, Value::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    /// Converts into the JSON tree.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Binary(bytes) => {
                let mut object = serde_json::Map::new();
                object.insert(
                    BINARY_KEY.to_string(),
                    serde_json::Value::String(BASE64.encode(bytes)),
                );
                serde_json::Value::Object(object)
            }
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Looks up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Condition semantics for rule and if-part results.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty() && s != "false",
            Value::Binary(bytes) => !bytes.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Merges `other` into this value.
    ///
    /// Maps merge key by key, recursively. Any other combination replaces
    /// this value with `other`.
    pub fn merge(&mut self, other: &Value) {
        match (self, other) {
            (Value::Map(target), Value::Map(source)) => {
                for (key, value) in source.iter() {
                    match target.get_mut(key) {
                        Some(existing) => existing.merge(value),
                        None => target.insert(key.to_string(), value.clone()),
                    }
                }
            }
            (target, source) => *target = source.clone(),
        }
    }

    /// Returns the merged result without touching this value.
    pub fn merged_with(&self, other: &Value) -> Value {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Map(_) => "map",
            Value::List(_) => "list",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Number::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(map)
    }
}

#[cfg(test)]
#[path = "tests/value_tests.rs"]
mod tests;
