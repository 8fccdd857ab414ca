//! Cache key canonicalization
//!
//! A logical request is described by a namespace, an identifier and a bag of
//! parameters. The stored key is the SHA-256 of a canonical encoding in which
//! object keys are always sorted, so two requests that differ only in
//! parameter order hit the same entry.

use crate::cache::types::CacheKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The logical parts of a cache key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheKeyComponents {
    /// Logical grouping used by `clear_namespace`
    pub namespace: String,

    /// Primary identifier inside the namespace
    pub identifier: String,

    /// Additional request parameters
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl CacheKeyComponents {
    /// Create key components without parameters
    pub fn new(namespace: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            identifier: identifier.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Deterministic textual encoding of all components
    pub fn canonical_string(&self) -> String {
        let mut out = String::with_capacity(64);
        write_canonical_str(&self.namespace, &mut out);
        out.push('|');
        write_canonical_str(&self.identifier, &mut out);
        out.push('|');
        out.push('{');
        for (i, (key, value)) in self.params.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_canonical_str(key, &mut out);
            out.push(':');
            write_canonical(value, &mut out);
        }
        out.push('}');
        out
    }

    /// The stored key: hex SHA-256 of the canonical string
    pub fn cache_key(&self) -> CacheKey {
        hash_hex(&self.canonical_string())
    }
}

impl From<(&str, &str)> for CacheKeyComponents {
    fn from((namespace, identifier): (&str, &str)) -> Self {
        Self::new(namespace, identifier)
    }
}

/// Hex-encoded SHA-256 of `input`
pub(crate) fn hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Write `value` as JSON with object keys sorted at every depth.
///
/// serde_json's map ordering depends on crate features chosen elsewhere in
/// the dependency graph, so ordering is enforced here instead.
pub(crate) fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical_str(key, out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn write_canonical_str(s: &str, out: &mut String) {
    out.push_str(&Value::String(s.to_string()).to_string());
}
