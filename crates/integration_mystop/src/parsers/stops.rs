//! Stop metadata (`Stops/Get/{stopId}`)

use serde_json::Value;

use crate::validation::NumericId;

/// Display name of a stop, or its id when the payload carries none
#[must_use]
pub fn parse_stop_name(data: &Value, stop_id: &NumericId) -> String {
    match data.get("Name") {
        Some(Value::String(name)) if !name.is_empty() => name.clone(),
        _ => stop_id.to_string(),
    }
}
