//! Departure and alert presentation
//!
//! Turns parsed records into the states a host renders: the next-departure
//! label for a stop, alert counts, stable unique ids, and device grouping.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use integration_mystop::{Alert, Departure};
use serde::{Deserialize, Serialize};

use crate::setup::SetupEntry;

/// Manufacturer reported on every device
pub const MANUFACTURER: &str = "Avail Technologies";

/// Model reported on every device
pub const MODEL: &str = "myStop";

/// State shown when a stop has no upcoming departures
pub const NO_SERVICE: &str = "No Service";

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Keep the departures of one route (if given), ordered by ETA
///
/// ETAs are compared as text; departures without one go last.
pub fn filter_departures(departures: &[Departure], route_id: Option<&str>) -> Vec<Departure> {
    let mut filtered: Vec<Departure> = departures
        .iter()
        .filter(|d| route_id.is_none_or(|id| d.route_id.as_deref() == Some(id)))
        .cloned()
        .collect();

    filtered.sort_by(|a, b| match (&a.eta, &b.eta) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    filtered
}

/// Human direction for a direction code
pub fn direction_label(direction: Option<&str>) -> &'static str {
    if direction == Some("O") {
        "Outbound"
    } else {
        "Inbound"
    }
}

/// Parse an upstream local timestamp
///
/// Accepts ISO 8601 with or without an offset; an offset is kept as the
/// wall-clock time it describes.
pub fn parse_local_time(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// `"8:15 AM"` style clock time, or `None` if `raw` is not a timestamp
pub fn format_clock_time(raw: &str) -> Option<String> {
    parse_local_time(raw).map(|dt| dt.format("%-I:%M %p").to_string())
}

/// State of a stop: `"{direction} - {time}"` for the first departure
///
/// Expects departures already ordered by [`filter_departures`].
pub fn next_departure_label(departures: &[Departure]) -> String {
    let Some(next) = departures.first() else {
        return NO_SERVICE.to_string();
    };

    let time = next.eta.as_deref().map_or_else(
        || "Unknown".to_string(),
        |eta| format_clock_time(eta).unwrap_or_else(|| eta.to_string()),
    );
    format!("{} - {time}", direction_label(next.direction.as_deref()))
}

/// Sort key for route labels: numeric abbreviations first, in numeric order
pub fn route_sort_key(label: &str) -> (u64, String) {
    let head = label.split(" - ").next().unwrap_or_default();
    let rank = if !head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()) {
        head.parse().unwrap_or(u64::MAX)
    } else {
        u64::MAX
    };
    (rank, label.to_string())
}

/// Sort route labels with [`route_sort_key`]
pub fn sort_route_labels<'a>(labels: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut labels: Vec<String> = labels.into_iter().cloned().collect();
    labels.sort_by_cached_key(|label| route_sort_key(label));
    labels
}

/// Stop name without its trailing `" (id)"`
pub fn stop_clean_name(label: &str) -> &str {
    label.rsplit_once(" (").map_or(label, |(name, _)| name)
}

/// Lowercase ASCII slug with `_` separators
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_separator = false;

    for c in text.chars().filter(|c| *c != '\'') {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    slug
}

/// Unique id of a stop's next-departure sensor
pub fn stop_unique_id(agency: &str, stop_id: &str) -> String {
    slugify(&format!("{agency}_{stop_id}_next_departure"))
}

/// Unique id of an agency's general alerts sensor
pub fn general_alerts_unique_id(agency: &str) -> String {
    slugify(&format!("{agency}_general_alerts"))
}

/// Unique id of a route's alerts sensor
pub fn route_alerts_unique_id(agency: &str, route_id: &str) -> String {
    slugify(&format!("{agency}_route_{route_id}_alerts"))
}

/// Device a sensor is grouped under
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Slugified identifier
    pub identifier: String,
    /// Display name
    pub name: String,
    /// Always [`MANUFACTURER`]
    pub manufacturer: String,
    /// Always [`MODEL`]
    pub model: String,
}

impl DeviceInfo {
    fn new(identifier: &str, name: String) -> Self {
        Self {
            identifier: slugify(identifier),
            name,
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
        }
    }

    /// Device for one route of an agency
    pub fn route(agency: &str, route_id: &str, route_name: Option<&str>) -> Self {
        let display = route_name
            .filter(|name| !name.is_empty())
            .map_or_else(|| format!("Route {route_id}"), ToString::to_string);
        Self::new(&format!("{agency}_route_{route_id}"), format!("{agency} {display}"))
    }

    /// Device collecting an agency's stops that are not tied to a route
    pub fn agency_stops(agency: &str) -> Self {
        Self::new(&format!("{agency}_stops"), format!("{agency} Stops"))
    }

    /// Device holding agency-wide information
    pub fn agency_info(agency: &str) -> Self {
        Self::new(&format!("{agency}_info"), format!("{agency} Info"))
    }

    /// Device for a stop sensor
    pub fn for_stop(entry: &SetupEntry) -> Self {
        match entry.route_id.as_deref() {
            Some(route_id) => Self::route(&entry.agency_name, route_id, entry.route_name.as_deref()),
            None => Self::agency_stops(&entry.agency_name),
        }
    }
}

/// Attributes of a stop sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAttributes {
    /// Stop id
    pub stop_id: String,
    /// Stop display name
    pub stop_name: String,
    /// Agency display name
    pub agency: String,
    /// Filtered, ordered departures
    pub departures: Vec<Departure>,
}

/// Renderable state of a stop's next-departure sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSensorState {
    /// Stable unique id
    pub unique_id: String,
    /// Display name (the stop name)
    pub name: String,
    /// Icon hint
    pub icon: String,
    /// Next-departure label
    pub state: String,
    /// Detailed attributes
    pub attributes: StopAttributes,
    /// Owning device
    pub device: DeviceInfo,
}

impl StopSensorState {
    /// Build the stop state from the latest departures
    pub fn build(entry: &SetupEntry, departures: &[Departure]) -> Self {
        let departures = filter_departures(departures, entry.route_id.as_deref());
        Self {
            unique_id: stop_unique_id(&entry.agency_name, &entry.stop_id),
            name: entry.stop_name.clone(),
            icon: "mdi:bus".to_string(),
            state: next_departure_label(&departures),
            attributes: StopAttributes {
                stop_id: entry.stop_id.clone(),
                stop_name: entry.stop_name.clone(),
                agency: entry.agency_name.clone(),
                departures,
            },
            device: DeviceInfo::for_stop(entry),
        }
    }
}

/// Attributes of an alerts sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsAttributes {
    /// Current alerts
    pub alerts: Vec<Alert>,
    /// Agency display name
    pub agency: String,
    /// `"General"` or `"Route"`
    #[serde(rename = "type")]
    pub kind: String,
}

/// Renderable state of an alerts sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsSensorState {
    /// Stable unique id
    pub unique_id: String,
    /// Display name
    pub name: String,
    /// Icon hint
    pub icon: String,
    /// Number of current alerts
    pub state: usize,
    /// Detailed attributes
    pub attributes: AlertsAttributes,
    /// Owning device
    pub device: DeviceInfo,
}

impl AlertsSensorState {
    /// Agency-wide alerts
    pub fn general(agency: &str, alerts: &[Alert]) -> Self {
        Self {
            unique_id: general_alerts_unique_id(agency),
            name: "General Alerts".to_string(),
            icon: "mdi:alert-circle".to_string(),
            state: alerts.len(),
            attributes: AlertsAttributes {
                alerts: alerts.to_vec(),
                agency: agency.to_string(),
                kind: "General".to_string(),
            },
            device: DeviceInfo::agency_info(agency),
        }
    }

    /// Alerts of one route
    pub fn route(agency: &str, route_id: &str, route_name: Option<&str>, alerts: &[Alert]) -> Self {
        Self {
            unique_id: route_alerts_unique_id(agency, route_id),
            name: "Route Alerts".to_string(),
            icon: "mdi:alert-octagon".to_string(),
            state: alerts.len(),
            attributes: AlertsAttributes {
                alerts: alerts.to_vec(),
                agency: agency.to_string(),
                kind: "Route".to_string(),
            },
            device: DeviceInfo::route(agency, route_id, route_name),
        }
    }
}
