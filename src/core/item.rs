//! # Items
//!
//! List entries are opaque JSON records. The pager never looks inside them
//! except to pull out an identity through a [`KeyPath`] and to merge patches
//! for optimistic updates.

use serde_json::{Map, Value};
use std::fmt;

/// A single list entry.
pub type Item = Value;

/// Dotted path into an item used to extract its identity (e.g. `"user.id"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl Default for KeyPath {
    fn default() -> Self {
        Self::new("id")
    }
}

impl KeyPath {
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Walks the path through nested objects. Numeric segments also index arrays.
    pub fn extract<'a>(&self, item: &'a Item) -> Option<&'a Value> {
        let mut current = item;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(values) => values.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// True if the item's identity equals `key`. Items without a key never match.
    pub fn matches(&self, item: &Item, key: &Value) -> bool {
        self.extract(item).is_some_and(|k| k == key)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Shallow-merges `patch` into `item`. Only fields present in the patch change.
///
/// Non-object items are replaced wholesale by the patch object.
pub fn merge_patch(item: &mut Item, patch: Map<String, Value>) {
    match item {
        Value::Object(fields) => {
            for (k, v) in patch {
                fields.insert(k, v);
            }
        }
        other => *other = Value::Object(patch),
    }
}

/// One-line rendering used by the terminal list and `--print`.
pub fn summarize(item: &Item, key_path: &KeyPath) -> String {
    let body = serde_json::to_string(item).unwrap_or_else(|_| "<unprintable>".to_string());
    match key_path.extract(item) {
        Some(Value::String(s)) => format!("[{s}] {body}"),
        Some(key) => format!("[{key}] {body}"),
        None => body,
    }
}
