//! Loosely typed product payloads from the real-time Amazon data API.
//!
//! Two schema generations exist for the same concepts (`title` vs
//! `product_title`, `price.current_price` vs `product_price`, ...). Nothing
//! in the payload is guaranteed, so records stay as raw JSON and are read
//! through fallback accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Top-level envelope of `GET /product-details`.
#[derive(Debug, Deserialize)]
pub struct ProductDetailsEnvelope {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// One untrusted upstream product record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawProductRecord(pub Map<String, Value>);

/// JavaScript-style truthiness, which is how the upstream API signals
/// "absent" across schema generations: `null`, `false`, `0`, `""`.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl RawProductRecord {
    /// Wraps a JSON value when it is a non-empty object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) if !map.is_empty() => Some(Self(map)),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Resolves a `/`-separated path such as `price/current_price`.
    #[must_use]
    pub fn path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('/');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// First truthy value among `paths`, in order.
    #[must_use]
    pub fn first(&self, paths: &[&str]) -> Option<&Value> {
        paths
            .iter()
            .filter_map(|p| self.path(p))
            .find(|v| is_truthy(v))
    }

    /// First non-empty string among `paths`, in order.
    #[must_use]
    pub fn first_str(&self, paths: &[&str]) -> Option<&str> {
        paths
            .iter()
            .filter_map(|p| self.path(p))
            .filter_map(Value::as_str)
            .find(|s| !s.trim().is_empty())
    }

    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.path(key).is_some_and(is_truthy)
    }

    /// ASIN of the parent listing, when the record names one.
    #[must_use]
    pub fn parent_asin(&self) -> Option<&str> {
        self.first_str(&["parent_asin", "landing_asin"])
    }
}
