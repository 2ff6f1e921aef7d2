//! Periodic refresh of stop monitors
//!
//! Each feed (departures, agency alerts, route alerts) runs on its own
//! interval and publishes an immutable [`FeedSnapshot`] on a watch channel.
//! The client already degrades polling failures to empty results, so a
//! feed tracks how many empty results arrived in a row and reports itself
//! stale once that count crosses the configured threshold. Alert feeds are
//! exempt: an agency with no alerts is the normal case.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use integration_mystop::{Alert, Departure, IdValue, MyStopClient, MyStopError};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::error::ApplicationError;
use crate::presentation::{
    AlertsSensorState, StopSensorState, general_alerts_unique_id, route_alerts_unique_id,
    stop_unique_id,
};
use crate::setup::SetupEntry;

/// Refresh cadences for a stop monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSchedule {
    /// Departures refresh interval in seconds (default: 60)
    #[serde(default = "default_departures_interval")]
    pub departures_interval_secs: u64,

    /// Alerts and route alerts refresh interval in seconds (default: 300)
    #[serde(default = "default_alerts_interval")]
    pub alerts_interval_secs: u64,

    /// Consecutive empty results before a feed is reported stale (default: 3)
    #[serde(default = "default_stale_after")]
    pub stale_after_empty_polls: u32,
}

const fn default_departures_interval() -> u64 {
    60
}

const fn default_alerts_interval() -> u64 {
    300
}

const fn default_stale_after() -> u32 {
    3
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            departures_interval_secs: default_departures_interval(),
            alerts_interval_secs: default_alerts_interval(),
            stale_after_empty_polls: default_stale_after(),
        }
    }
}

impl PollSchedule {
    /// Departures interval as a `Duration`
    #[must_use]
    pub const fn departures_interval(&self) -> Duration {
        Duration::from_secs(self.departures_interval_secs)
    }

    /// Alerts interval as a `Duration`
    #[must_use]
    pub const fn alerts_interval(&self) -> Duration {
        Duration::from_secs(self.alerts_interval_secs)
    }

    /// Validate the schedule
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::Configuration`] if an interval is zero.
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.departures_interval_secs == 0 {
            return Err(ApplicationError::Configuration(
                "departures_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.alerts_interval_secs == 0 {
            return Err(ApplicationError::Configuration(
                "alerts_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Health of a feed as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedStatus {
    /// No poll has completed yet
    Pending,
    /// The last poll produced usable data
    Fresh,
    /// Too many consecutive polls came back empty
    Stale,
    /// The last poll failed; data is from the previous success
    Failed,
}

/// Result of the latest poll of a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot<T> {
    /// Records from the latest successful poll
    pub data: Vec<T>,
    /// Feed health
    pub status: FeedStatus,
    /// Empty results received in a row
    pub consecutive_empty: u32,
    /// When the last successful poll completed
    pub last_updated: Option<DateTime<Utc>>,
    /// Message of the last failure, cleared on success
    pub last_error: Option<String>,
}

impl<T> Default for FeedSnapshot<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T> FeedSnapshot<T> {
    /// Snapshot before the first poll
    #[must_use]
    pub const fn pending() -> Self {
        Self {
            data: Vec::new(),
            status: FeedStatus::Pending,
            consecutive_empty: 0,
            last_updated: None,
            last_error: None,
        }
    }

    /// Whether the host should treat the data as unavailable
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self.status, FeedStatus::Stale | FeedStatus::Failed)
    }
}

impl<T: Clone> FeedSnapshot<T> {
    /// Fold one poll result into the next snapshot
    #[must_use]
    pub fn apply(
        &self,
        result: Result<Vec<T>, MyStopError>,
        now: DateTime<Utc>,
        stale_after: u32,
    ) -> Self {
        match result {
            Ok(data) => {
                let consecutive_empty = if data.is_empty() {
                    self.consecutive_empty.saturating_add(1)
                } else {
                    0
                };
                let status = if stale_after > 0 && consecutive_empty >= stale_after {
                    FeedStatus::Stale
                } else {
                    FeedStatus::Fresh
                };
                Self {
                    data,
                    status,
                    consecutive_empty,
                    last_updated: Some(now),
                    last_error: None,
                }
            },
            Err(err) => Self {
                data: self.data.clone(),
                status: FeedStatus::Failed,
                consecutive_empty: self.consecutive_empty,
                last_updated: self.last_updated,
                last_error: Some(err.to_string()),
            },
        }
    }
}

/// A data source refreshed on a fixed cadence
#[async_trait]
pub trait PolledFeed: Send + Sync + 'static {
    /// Record type produced by the feed
    type Item: Clone + Send + Sync + 'static;

    /// Name used in log fields
    fn name(&self) -> String;

    /// Fetch the current records
    async fn fetch(&self) -> Result<Vec<Self::Item>, MyStopError>;

    /// Whether an empty result counts towards staleness
    ///
    /// Feeds where "nothing" is a normal answer, like alerts, return false
    /// and are never reported stale.
    fn empty_means_missing(&self) -> bool {
        true
    }
}

/// Departures at one stop
pub struct DeparturesFeed {
    client: Arc<dyn MyStopClient>,
    stop_id: String,
}

impl DeparturesFeed {
    /// Create a departures feed for `stop_id`
    #[must_use]
    pub fn new(client: Arc<dyn MyStopClient>, stop_id: impl Into<String>) -> Self {
        Self {
            client,
            stop_id: stop_id.into(),
        }
    }
}

#[async_trait]
impl PolledFeed for DeparturesFeed {
    type Item = Departure;

    fn name(&self) -> String {
        format!("departures:{}", self.stop_id)
    }

    async fn fetch(&self) -> Result<Vec<Departure>, MyStopError> {
        self.client.list_departures(IdValue::from(&self.stop_id)).await
    }
}

/// Agency-wide alerts
pub struct AlertsFeed {
    client: Arc<dyn MyStopClient>,
}

impl AlertsFeed {
    /// Create an agency alerts feed
    #[must_use]
    pub fn new(client: Arc<dyn MyStopClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PolledFeed for AlertsFeed {
    type Item = Alert;

    fn name(&self) -> String {
        "alerts".to_string()
    }

    fn empty_means_missing(&self) -> bool {
        false
    }

    async fn fetch(&self) -> Result<Vec<Alert>, MyStopError> {
        self.client.list_alerts().await
    }
}

/// Alerts attached to one route
pub struct RouteAlertsFeed {
    client: Arc<dyn MyStopClient>,
    route_id: String,
}

impl RouteAlertsFeed {
    /// Create a route alerts feed for `route_id`
    #[must_use]
    pub fn new(client: Arc<dyn MyStopClient>, route_id: impl Into<String>) -> Self {
        Self {
            client,
            route_id: route_id.into(),
        }
    }
}

#[async_trait]
impl PolledFeed for RouteAlertsFeed {
    type Item = Alert;

    fn name(&self) -> String {
        format!("route_alerts:{}", self.route_id)
    }

    fn empty_means_missing(&self) -> bool {
        false
    }

    async fn fetch(&self) -> Result<Vec<Alert>, MyStopError> {
        self.client
            .list_route_alerts(IdValue::from(&self.route_id))
            .await
    }
}

macro_rules! opaque_debug {
    ($($feed:ident),+) => {
        $(
            impl fmt::Debug for $feed {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_struct(stringify!($feed))
                        .field("name", &self.name())
                        .finish_non_exhaustive()
                }
            }
        )+
    };
}

opaque_debug!(DeparturesFeed, AlertsFeed, RouteAlertsFeed);

/// Poll `feed` once and fold the result into `previous`
///
/// `stale_after` is ignored for feeds whose empty results are normal.
#[instrument(skip(feed, previous), fields(feed = %feed.name()))]
pub async fn poll_once<F: PolledFeed + ?Sized>(
    feed: &F,
    previous: &FeedSnapshot<F::Item>,
    stale_after: u32,
) -> FeedSnapshot<F::Item> {
    let stale_after = if feed.empty_means_missing() {
        stale_after
    } else {
        0
    };
    let result = feed.fetch().await;
    let next = previous.apply(result, Utc::now(), stale_after);

    match next.status {
        FeedStatus::Failed => {
            warn!(error = next.last_error.as_deref().unwrap_or_default(), "Feed refresh failed");
        },
        FeedStatus::Stale if previous.status != FeedStatus::Stale => {
            info!(consecutive_empty = next.consecutive_empty, "Feed is stale");
        },
        _ => debug!(count = next.data.len(), "Feed refreshed"),
    }
    next
}

/// A running feed task
///
/// Dropping the handle stops the task.
pub struct FeedHandle<T> {
    receiver: watch::Receiver<FeedSnapshot<T>>,
    task: JoinHandle<()>,
}

impl<T> fmt::Debug for FeedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedHandle")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl<T: Clone> FeedHandle<T> {
    /// The latest snapshot
    #[must_use]
    pub fn latest(&self) -> FeedSnapshot<T> {
        self.receiver.borrow().clone()
    }

    /// A receiver notified on every new snapshot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot<T>> {
        self.receiver.clone()
    }

    /// Stop polling
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl<T> Drop for FeedHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `feed` every `interval`, starting immediately
pub fn spawn_feed<F: PolledFeed>(
    feed: Arc<F>,
    interval: Duration,
    stale_after: u32,
) -> FeedHandle<F::Item> {
    let (sender, receiver) = watch::channel(FeedSnapshot::pending());

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let previous = sender.borrow().clone();
            let next = poll_once(feed.as_ref(), &previous, stale_after).await;
            if sender.send(next).is_err() {
                debug!(feed = %feed.name(), "No subscribers left, stopping feed");
                break;
            }
        }
    });

    FeedHandle { receiver, task }
}

/// Which feeds a configured stop needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorPlan {
    /// Unique id of the next-departure sensor
    pub stop_unique_id: String,
    /// Unique id of the agency alerts sensor, if this stop should own it
    pub general_alerts_unique_id: Option<String>,
    /// Route id and unique id of the route alerts sensor, if this stop should own it
    pub route_alerts: Option<(String, String)>,
}

impl MonitorPlan {
    /// Plan the feeds for `entry`, skipping alert sensors another stop already owns
    #[must_use]
    pub fn for_entry(entry: &SetupEntry, registered_ids: &HashSet<String>) -> Self {
        let general = general_alerts_unique_id(&entry.agency_name);
        let route_alerts = entry.route_id.as_ref().and_then(|route_id| {
            let unique_id = route_alerts_unique_id(&entry.agency_name, route_id);
            (!registered_ids.contains(&unique_id)).then(|| (route_id.clone(), unique_id))
        });

        Self {
            stop_unique_id: stop_unique_id(&entry.agency_name, &entry.stop_id),
            general_alerts_unique_id: (!registered_ids.contains(&general)).then_some(general),
            route_alerts,
        }
    }

    /// Every unique id this plan registers
    #[must_use]
    pub fn unique_ids(&self) -> Vec<String> {
        let mut ids = vec![self.stop_unique_id.clone()];
        ids.extend(self.general_alerts_unique_id.clone());
        ids.extend(self.route_alerts.as_ref().map(|(_, id)| id.clone()));
        ids
    }
}

/// The running feeds of one configured stop
#[derive(Debug)]
pub struct StopMonitor {
    entry: SetupEntry,
    departures: FeedHandle<Departure>,
    alerts: Option<FeedHandle<Alert>>,
    route_alerts: Option<(String, FeedHandle<Alert>)>,
}

impl StopMonitor {
    /// Start the feeds planned for `entry`
    pub fn spawn(
        client: Arc<dyn MyStopClient>,
        entry: SetupEntry,
        plan: &MonitorPlan,
        schedule: &PollSchedule,
    ) -> Self {
        let stale_after = schedule.stale_after_empty_polls;

        let departures = spawn_feed(
            Arc::new(DeparturesFeed::new(Arc::clone(&client), entry.stop_id.clone())),
            schedule.departures_interval(),
            stale_after,
        );

        let alerts = plan.general_alerts_unique_id.as_ref().map(|_| {
            spawn_feed(
                Arc::new(AlertsFeed::new(Arc::clone(&client))),
                schedule.alerts_interval(),
                stale_after,
            )
        });

        let route_alerts = plan.route_alerts.as_ref().map(|(route_id, _)| {
            let handle = spawn_feed(
                Arc::new(RouteAlertsFeed::new(Arc::clone(&client), route_id.clone())),
                schedule.alerts_interval(),
                stale_after,
            );
            (route_id.clone(), handle)
        });

        info!(
            unique_id = %plan.stop_unique_id,
            alerts = alerts.is_some(),
            route_alerts = route_alerts.is_some(),
            "Stop monitor started"
        );

        Self {
            entry,
            departures,
            alerts,
            route_alerts,
        }
    }

    /// The monitored stop
    #[must_use]
    pub const fn entry(&self) -> &SetupEntry {
        &self.entry
    }

    /// The departures feed
    #[must_use]
    pub const fn departures(&self) -> &FeedHandle<Departure> {
        &self.departures
    }

    /// The agency alerts feed, if this stop owns it
    #[must_use]
    pub const fn alerts(&self) -> Option<&FeedHandle<Alert>> {
        self.alerts.as_ref()
    }

    /// The route alerts feed, if this stop owns it
    #[must_use]
    pub fn route_alerts(&self) -> Option<&FeedHandle<Alert>> {
        self.route_alerts.as_ref().map(|(_, handle)| handle)
    }

    /// Current next-departure state
    #[must_use]
    pub fn stop_state(&self) -> StopSensorState {
        StopSensorState::build(&self.entry, &self.departures.latest().data)
    }

    /// Current agency alerts state, if this stop owns it
    #[must_use]
    pub fn general_alerts_state(&self) -> Option<AlertsSensorState> {
        self.alerts
            .as_ref()
            .map(|handle| AlertsSensorState::general(&self.entry.agency_name, &handle.latest().data))
    }

    /// Current route alerts state, if this stop owns it
    #[must_use]
    pub fn route_alerts_state(&self) -> Option<AlertsSensorState> {
        self.route_alerts.as_ref().map(|(route_id, handle)| {
            AlertsSensorState::route(
                &self.entry.agency_name,
                route_id,
                self.entry.route_name.as_deref(),
                &handle.latest().data,
            )
        })
    }

    /// Stop every feed
    pub fn stop(&self) {
        self.departures.stop();
        if let Some(handle) = &self.alerts {
            handle.stop();
        }
        if let Some((_, handle)) = &self.route_alerts {
            handle.stop();
        }
    }
}
