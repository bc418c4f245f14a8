//! Typed accessors over the gateway's dynamic JSON documents.

use serde_json::{Map, Value};

pub trait ValueExt {
    /// String value of `key`; numbers and booleans are rendered as text.
    fn get_string(&self, key: &str) -> Option<String>;

    /// Nested object stored under `key`.
    fn get_nested(&self, key: &str) -> Option<&Map<String, Value>>;

    /// Follows `path` through nested objects.
    fn get_path(&self, path: &[&str]) -> Option<&Value>;

    fn get_bool(&self, key: &str) -> Option<bool>;
}

impl ValueExt for Value {
    fn get_string(&self, key: &str) -> Option<String> {
        self.as_object().and_then(|map| map.get_string(key))
    }

    fn get_nested(&self, key: &str) -> Option<&Map<String, Value>> {
        self.as_object().and_then(|map| map.get_nested(key))
    }

    fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            current = current.as_object()?.get(*segment)?;
        }
        Some(current)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.as_object().and_then(|map| map.get_bool(key))
    }
}

impl ValueExt for Map<String, Value> {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn get_nested(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    fn get_path(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        self.get(*first)?.get_path(rest)
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// String at `path`, with the same coercions as [`ValueExt::get_string`].
pub fn string_at(value: &Value, path: &[&str]) -> Option<String> {
    let (last, parents) = path.split_last()?;
    value.get_path(parents)?.get_string(last)
}
