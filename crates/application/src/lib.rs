//! Application layer - stop monitoring on top of the MyStop client
//!
//! Hosts use this crate to walk a user through stop selection
//! ([`setup`]), keep the selected stop's departures and alerts refreshed on
//! two cadences ([`polling`]), and render the results ([`presentation`]).

pub mod error;
pub mod polling;
pub mod presentation;
pub mod setup;

#[cfg(test)]
mod testing;

pub use error::ApplicationError;
pub use polling::{
    AlertsFeed, DeparturesFeed, FeedHandle, FeedSnapshot, FeedStatus, MonitorPlan, PollSchedule,
    PolledFeed, RouteAlertsFeed, StopMonitor, poll_once, spawn_feed,
};
pub use presentation::{
    AlertsSensorState, DeviceInfo, StopSensorState, filter_departures, next_departure_label,
};
pub use setup::{
    AbortReason, AvailClientFactory, ClientFactory, MANUAL_ENTRY, ManualDefaults, SetupContext,
    SetupEntry, SetupErrorCode, SetupFlow, SetupInput, SetupStep,
};
