//! Canonical cache keys
//!
//! Keys follow `"{resource}:{id}"` for single records and
//! `"{resource}:{canonical json}"` for queries. Canonical JSON sorts object
//! keys recursively and drops null fields, so two option records with the same
//! content always produce the same key no matter how they were built.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Resource type tag that prefixes every cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Plan,
    Plans,
    Restaurant,
    Restaurants,
    Event,
    Events,
    Lodge,
    Lodges,
}

impl ResourceKind {
    /// All resource kinds
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Plan,
        ResourceKind::Plans,
        ResourceKind::Restaurant,
        ResourceKind::Restaurants,
        ResourceKind::Event,
        ResourceKind::Events,
        ResourceKind::Lodge,
        ResourceKind::Lodges,
    ];

    /// Key prefix for this resource
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Plan => "plan",
            ResourceKind::Plans => "plans",
            ResourceKind::Restaurant => "restaurant",
            ResourceKind::Restaurants => "restaurants",
            ResourceKind::Event => "event",
            ResourceKind::Events => "events",
            ResourceKind::Lodge => "lodge",
            ResourceKind::Lodges => "lodges",
        }
    }

    /// Parses a resource tag (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key for a single record, e.g. `plan:abc123`
pub fn record_key(kind: ResourceKind, id: &str) -> String {
    format!("{}:{}", kind, id)
}

/// Key for a query result, e.g. `plans:{"limit":10,"userId":"u1"}`
pub fn query_key<O: Serialize + ?Sized>(kind: ResourceKind, options: &O) -> String {
    let value = match serde_json::to_value(options) {
        Ok(value) => value,
        Err(e) => {
            warn!(resource = %kind, "Query options are not serializable: {}", e);
            Value::Null
        }
    };
    format!("{}:{}", kind, canonical_json(&value))
}

/// Parses the options back out of a key built by [`query_key`]
///
/// Returns `None` when the key belongs to another resource or its suffix is
/// not JSON.
pub fn query_options(key: &str, kind: ResourceKind) -> Option<Value> {
    let rest = key.strip_prefix(kind.as_str())?.strip_prefix(':')?;
    serde_json::from_str(rest).ok()
}

/// Serializes a value with sorted object keys and without null fields
pub fn canonical_json(value: &Value) -> String {
    normalize(value).to_string()
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            let mut out = Map::new();
            for key in keys {
                let field = &map[key];
                if !field.is_null() {
                    out.insert(key.clone(), normalize(field));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}
