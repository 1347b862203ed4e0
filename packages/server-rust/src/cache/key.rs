//! Cache key derivation.
//!
//! Keys are `"<category>:<blake3 hex>"` over a canonical JSON rendering of the
//! payload in which object keys are sorted at every depth, so two payloads
//! that differ only in field order share a key.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Identifies one cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    value: String,
    identity: bool,
}

impl CacheKey {
    /// Derives the key for `payload` submitted under `category`.
    ///
    /// A payload that cannot be turned into JSON gets a fresh identity key,
    /// which can never be hit by another call.
    pub fn derive<T: Serialize + ?Sized>(category: &str, payload: &T) -> Self {
        match serde_json::to_value(payload) {
            Ok(value) => {
                let mut canonical = String::new();
                write_canonical(&value, &mut canonical);
                let digest = blake3::hash(canonical.as_bytes());
                Self {
                    value: format!("{category}:{}", hex::encode(digest.as_bytes())),
                    identity: false,
                }
            }
            Err(err) => {
                debug!(category, error = %err, "payload is not serializable, using identity cache key");
                Self {
                    value: format!("{category}:identity:{}", Uuid::new_v4()),
                    identity: true,
                }
            }
        }
    }

    /// True when the key was derived from an unserializable payload.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_unstable_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
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
        scalar => out.push_str(&scalar.to_string()),
    }
}
