//! Service alerts (`PublicMessages/GetCurrentMessages`, `RouteDetails/Get/{routeId}`)

use serde_json::Value;

use super::{array_items, value_to_string};
use crate::models::Alert;

/// Map a message list into alerts
///
/// Anything other than an array yields no alerts. Elements that are not
/// objects still produce a record, with every field absent.
#[must_use]
pub fn parse_alerts(data: &Value) -> Vec<Alert> {
    array_items(data).iter().map(alert_from_value).collect()
}

/// Extract the alerts nested in a route-details response
///
/// The response is either an array whose first element carries the route,
/// or the route object itself. Its `Messages` list is parsed with
/// [`parse_alerts`].
#[must_use]
pub fn parse_route_alerts(data: &Value) -> Vec<Alert> {
    let route = match data {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(data),
        _ => None,
    };

    route
        .and_then(|route| route.get("Messages"))
        .map(parse_alerts)
        .unwrap_or_default()
}

fn alert_from_value(value: &Value) -> Alert {
    let Some(msg) = value.as_object() else {
        return Alert::default();
    };

    let scalar = |key: &str| msg.get(key).filter(|v| !v.is_null()).cloned();
    let text = |key: &str| msg.get(key).and_then(value_to_string);

    Alert {
        id: scalar("MessageId"),
        header: text("Header"),
        message: text("Message"),
        priority: scalar("Priority"),
    }
}
