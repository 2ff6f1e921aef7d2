//! Domain parsers
//!
//! Each parser is a pure function from a decoded payload to normalized
//! records. Upstream payloads are loosely typed, so the raw shapes keep
//! `serde_json::Value` fields and the helpers here apply the lenient
//! truthiness and stringification rules shared by every endpoint.

pub mod agencies;
pub mod alerts;
pub mod departures;
pub mod routes;
pub mod stops;

use serde::Deserialize;
use serde_json::Value;

pub use agencies::parse_agencies;
pub use alerts::{parse_alerts, parse_route_alerts};
pub use departures::{parse_departures, parse_departures_json, parse_departures_xml};
pub use routes::parse_routes;
pub use stops::parse_stop_name;

/// Loose truthiness of a JSON value
///
/// `null`, `false`, zero, and empty strings, arrays, or objects are false.
pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text form of a scalar JSON value
///
/// Strings pass through, numbers and booleans are stringified, and `null`,
/// arrays, and objects yield `None`.
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Like [`value_to_string`] but also rejects the empty string
pub(crate) fn nonempty_string(value: &Value) -> Option<String> {
    value_to_string(value).filter(|s| !s.is_empty())
}

/// Deserialize one element of a loosely typed list
///
/// Elements that are not objects, or whose fields cannot be read into `T`,
/// yield `None` so a single bad record never discards its siblings.
pub(crate) fn raw_record<T>(value: &Value) -> Option<T>
where
    T: for<'de> Deserialize<'de>,
{
    if !value.is_object() {
        return None;
    }
    T::deserialize(value).ok()
}

/// Elements of an array value, or nothing
pub(crate) fn array_items(value: &Value) -> &[Value] {
    value.as_array().map_or(&[], Vec::as_slice)
}
