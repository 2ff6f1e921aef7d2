//! Route and stop topology (`RouteDetails/GetAllRouteDetails`)

use serde::Deserialize;
use serde_json::Value;

use super::{array_items, nonempty_string, raw_record, truthy, value_to_string};
use crate::models::{RouteCatalog, StopMap};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawRoute {
    route_id: Value,
    route_abbreviation: Value,
    short_name: Value,
    long_name: Value,
    is_visible: Value,
    stops: Value,
}

impl Default for RawRoute {
    fn default() -> Self {
        Self {
            route_id: Value::Null,
            route_abbreviation: Value::Null,
            short_name: Value::Null,
            long_name: Value::Null,
            // Routes that do not say otherwise are visible
            is_visible: Value::Bool(true),
            stops: Value::Null,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawStop {
    stop_id: Value,
    name: Value,
}

/// Build the route catalog from the full route-details listing
///
/// Anything other than an array yields an empty catalog.
#[must_use]
pub fn parse_routes(data: &Value) -> RouteCatalog {
    let mut catalog = RouteCatalog::default();

    for raw in array_items(data).iter().filter_map(raw_record::<RawRoute>) {
        if !truthy(&raw.is_visible) {
            continue;
        }
        let Some(route_id) = nonempty_string(&raw.route_id) else {
            continue;
        };

        catalog.routes.insert(route_label(&raw), route_id.clone());
        catalog.stops.insert(route_id, parse_stops(&raw.stops));
    }

    catalog
}

fn route_label(raw: &RawRoute) -> String {
    let abbreviation = nonempty_string(&raw.route_abbreviation)
        .or_else(|| value_to_string(&raw.short_name))
        .unwrap_or_default();
    let long_name = value_to_string(&raw.long_name).unwrap_or_default();

    format!("{abbreviation} - {long_name}")
        .trim_matches(|c| c == ' ' || c == '-')
        .to_string()
}

fn parse_stops(stops: &Value) -> StopMap {
    array_items(stops)
        .iter()
        .filter_map(raw_record::<RawStop>)
        .filter_map(|stop| {
            match (nonempty_string(&stop.name), nonempty_string(&stop.stop_id)) {
                (Some(name), Some(id)) => Some((format!("{name} ({id})"), id)),
                // Unnamed stops are labelled by their id
                (None, Some(id)) => Some((format!("{id} ({id})"), id)),
                // Without an id the label is just the name and the id stays empty
                (Some(name), None) => Some((name, String::new())),
                (None, None) => None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_label_and_stops() {
        let data = json!([{
            "RouteId": 5,
            "RouteAbbreviation": "5",
            "LongName": "Main St",
            "Stops": [{"StopId": 101, "Name": "Main & 1st"}]
        }]);

        let catalog = parse_routes(&data);
        assert_eq!(catalog.route_id("5 - Main St"), Some("5"));
        let stops = catalog.stops_for("5").unwrap();
        assert_eq!(stops.get("Main & 1st (101)").map(String::as_str), Some("101"));
    }

    #[test]
    fn test_abbreviation_falls_back_to_short_name() {
        let data = json!([{"RouteId": 7, "RouteAbbreviation": "", "ShortName": "7X", "LongName": "Express"}]);
        let catalog = parse_routes(&data);
        assert_eq!(catalog.route_id("7X - Express"), Some("7"));
    }

    #[test]
    fn test_label_trims_dashes_and_spaces() {
        let data = json!([
            {"RouteId": 1, "RouteAbbreviation": "1"},
            {"RouteId": 2, "LongName": "Crosstown"},
            {"RouteId": 3, "LongName": null, "ShortName": null}
        ]);
        let catalog = parse_routes(&data);
        assert_eq!(catalog.route_id("1"), Some("1"));
        assert_eq!(catalog.route_id("Crosstown"), Some("2"));
        assert_eq!(catalog.route_id(""), Some("3"));
    }

    #[test]
    fn test_invisible_routes_excluded() {
        let data = json!([
            {"RouteId": 1, "RouteAbbreviation": "1", "IsVisible": false},
            {"RouteId": 2, "RouteAbbreviation": "2", "IsVisible": true},
            {"RouteId": 3, "RouteAbbreviation": "3"}
        ]);
        let catalog = parse_routes(&data);
        assert_eq!(catalog.routes.len(), 2);
        assert!(catalog.stops_for("1").is_none());
        assert_eq!(catalog.stops_for("3").map(StopMap::len), Some(0));
    }

    #[test]
    fn test_stops_missing_both_id_and_name_skipped() {
        let data = json!([{
            "RouteId": 9,
            "RouteAbbreviation": "9",
            "Stops": [
                {"StopId": 1, "Name": "A"},
                {"StopId": 2},
                {"StopId": 4, "Name": ""},
                {"StopId": null, "Name": null},
                {},
                "garbage"
            ]
        }]);
        let catalog = parse_routes(&data);
        let stops = catalog.stops_for("9").unwrap();
        assert_eq!(stops.len(), 3);
        assert_eq!(stops.get("A (1)").map(String::as_str), Some("1"));
        assert_eq!(stops.get("2 (2)").map(String::as_str), Some("2"));
        assert_eq!(stops.get("4 (4)").map(String::as_str), Some("4"));
    }

    #[test]
    fn test_named_stop_without_id_kept() {
        let data = json!([{"RouteId": 1, "Stops": [{"Name": "Hub"}]}]);
        let catalog = parse_routes(&data);
        let stops = catalog.stops_for("1").unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops.get("Hub").map(String::as_str), Some(""));
    }

    #[test]
    fn test_routes_without_id_skipped() {
        let data = json!([{"RouteAbbreviation": "X"}, {"RouteId": null, "RouteAbbreviation": "Y"}]);
        assert!(parse_routes(&data).is_empty());
    }

    #[test]
    fn test_non_array_is_empty() {
        assert!(parse_routes(&json!({"RouteId": 1})).is_empty());
        assert!(parse_routes(&json!(null)).is_empty());
    }

    #[test]
    fn test_duplicate_labels_last_wins() {
        let data = json!([
            {"RouteId": 1, "RouteAbbreviation": "A", "LongName": "Loop"},
            {"RouteId": 2, "RouteAbbreviation": "A", "LongName": "Loop"}
        ]);
        let catalog = parse_routes(&data);
        assert_eq!(catalog.route_id("A - Loop"), Some("2"));
        assert_eq!(catalog.stops.len(), 2);
    }
}
