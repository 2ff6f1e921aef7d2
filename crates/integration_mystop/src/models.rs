//! Normalized MyStop records
//!
//! These are the shapes handed to callers regardless of whether the agency
//! answered in JSON or XML.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::validation::BaseUrl;

/// Agency name to validated base URL
pub type AgencyDirectory = BTreeMap<String, BaseUrl>;

/// Route label to route id
pub type RouteMap = BTreeMap<String, String>;

/// Stop label to stop id
pub type StopMap = BTreeMap<String, String>;

/// Route and stop topology for one agency
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteCatalog {
    /// `"{abbreviation} - {long name}"` to route id
    pub routes: RouteMap,
    /// Route id to that route's stops
    pub stops: BTreeMap<String, StopMap>,
}

impl RouteCatalog {
    /// Whether the catalog holds no visible routes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Stops served by `route_id`
    #[must_use]
    pub fn stops_for(&self, route_id: &str) -> Option<&StopMap> {
        self.stops.get(route_id)
    }

    /// Route id for a route label
    #[must_use]
    pub fn route_id(&self, label: &str) -> Option<&str> {
        self.routes.get(label).map(String::as_str)
    }
}

/// A single upcoming vehicle arrival at a stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Departure {
    /// Route identifier as text
    pub route_id: Option<String>,
    /// Direction code, e.g. `"I"` or `"O"`
    pub direction: Option<String>,
    /// Headsign, `"Unknown"` when the trip carries none
    pub destination: String,
    /// Estimated local time, falling back to the scheduled time
    pub eta: Option<String>,
    /// Human-readable status label
    pub status: Option<String>,
    /// Whether the arrival is based on live vehicle tracking
    pub is_realtime: bool,
}

/// A service alert, passed through as published
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// `MessageId`
    pub id: Option<Value>,
    /// `Header`
    pub header: Option<String>,
    /// `Message`
    pub message: Option<String>,
    /// `Priority`
    pub priority: Option<Value>,
}
