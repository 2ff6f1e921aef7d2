//! Avail MyStop API client
//!
//! [`MyStopClient`] is the interface the host programs against;
//! [`AvailClient`] implements it over an [`HttpFetcher`]. Every operation
//! validates its inputs before touching the network and then applies the
//! propagation rule from [`Operation::policy`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, instrument};

use crate::config::{MyStopConfig, TimeoutPolicy};
use crate::decoder::{DecodedPayload, decode_payload};
use crate::error::MyStopError;
use crate::fetcher::{HttpFetcher, HttpTransport, ReqwestTransport};
use crate::models::{AgencyDirectory, Alert, Departure, RouteCatalog};
use crate::parsers;
use crate::policy::Operation;
use crate::retry::RetryPolicy;
use crate::validation::{BaseUrl, IdValue, normalize_base_url, normalize_numeric_id};

/// Trait for MyStop clients
#[async_trait]
pub trait MyStopClient: Send + Sync {
    /// List every agency advertised by the discovery endpoint
    ///
    /// Never fails: any error yields an empty directory.
    async fn discover_agencies(&self, discovery_url: &str) -> AgencyDirectory;

    /// Fetch the route and stop topology of the configured agency
    async fn list_routes(&self) -> Result<RouteCatalog, MyStopError>;

    /// Fetch the upcoming departures at a stop
    ///
    /// Upstream failures yield an empty list.
    async fn list_departures(&self, stop_id: IdValue) -> Result<Vec<Departure>, MyStopError>;

    /// Fetch a stop's display name, falling back to its id
    async fn stop_name(&self, stop_id: IdValue) -> Result<String, MyStopError>;

    /// Fetch the agency-wide service alerts
    async fn list_alerts(&self) -> Result<Vec<Alert>, MyStopError>;

    /// Fetch the alerts attached to one route
    async fn list_route_alerts(&self, route_id: IdValue) -> Result<Vec<Alert>, MyStopError>;
}

/// Client for one Avail MyStop agency
///
/// Cheap to clone; clones share the transport.
#[derive(Debug, Clone)]
pub struct AvailClient {
    fetcher: HttpFetcher,
    base_url: Option<BaseUrl>,
}

impl AvailClient {
    /// Create a client with its own HTTP connection pool
    ///
    /// # Errors
    ///
    /// Returns [`MyStopError::InvalidConfig`] for an invalid configuration
    /// and [`MyStopError::ConnectionFailed`] if the HTTP client cannot be
    /// initialized.
    pub fn new(config: &MyStopConfig) -> Result<Self, MyStopError> {
        config.validate().map_err(MyStopError::InvalidConfig)?;
        let transport = ReqwestTransport::new(&config.timeout, &config.user_agent)?;
        Self::with_transport(
            Arc::new(transport),
            config.base_url.as_deref(),
            config.retry.clone(),
        )
    }

    /// Create a client on a host-owned `reqwest::Client`
    ///
    /// # Errors
    ///
    /// Returns [`MyStopError::InvalidConfig`] if `base_url` is malformed.
    pub fn with_http_client(
        client: Client,
        base_url: Option<&str>,
        timeout: TimeoutPolicy,
        retry: RetryPolicy,
    ) -> Result<Self, MyStopError> {
        let transport = ReqwestTransport::with_client(client, timeout);
        Self::with_transport(Arc::new(transport), base_url, retry)
    }

    /// Create a client over an arbitrary transport
    ///
    /// # Errors
    ///
    /// Returns [`MyStopError::InvalidConfig`] if `base_url` is malformed.
    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        base_url: Option<&str>,
        retry: RetryPolicy,
    ) -> Result<Self, MyStopError> {
        Ok(Self {
            fetcher: HttpFetcher::new(transport, retry),
            base_url: normalize_base_url(base_url)?,
        })
    }

    /// A client for another agency sharing this client's transport
    ///
    /// # Errors
    ///
    /// Returns [`MyStopError::InvalidConfig`] if `base_url` is malformed.
    pub fn with_base_url(&self, base_url: Option<&str>) -> Result<Self, MyStopError> {
        Ok(Self {
            fetcher: self.fetcher.clone(),
            base_url: normalize_base_url(base_url)?,
        })
    }

    /// The normalized agency base URL, if configured
    #[must_use]
    pub const fn base_url(&self) -> Option<&BaseUrl> {
        self.base_url.as_ref()
    }

    fn require_base_url(&self) -> Result<&BaseUrl, MyStopError> {
        self.base_url
            .as_ref()
            .ok_or_else(|| MyStopError::InvalidConfig("base_url is required".to_string()))
    }

    async fn fetch_departures(&self, url: &str) -> Result<Vec<Departure>, MyStopError> {
        let body = self.fetcher.fetch_text(url).await?;
        let payload = decode_payload(&body);
        if matches!(payload, DecodedPayload::Unparseable) {
            error!(%url, "Failed to parse departures response");
        }
        Ok(parsers::parse_departures(&payload))
    }
}

#[async_trait]
impl MyStopClient for AvailClient {
    #[instrument(skip(self))]
    async fn discover_agencies(&self, discovery_url: &str) -> AgencyDirectory {
        let result = self
            .fetcher
            .fetch_json(discovery_url)
            .await
            .map(|data| parsers::parse_agencies(&data));

        let agencies = Operation::DiscoverAgencies
            .resolve(result, AgencyDirectory::new)
            .unwrap_or_default();
        debug!(count = agencies.len(), "Agencies discovered");
        agencies
    }

    #[instrument(skip(self))]
    async fn list_routes(&self) -> Result<RouteCatalog, MyStopError> {
        let url = self
            .require_base_url()?
            .rest_endpoint("RouteDetails/GetAllRouteDetails");
        let result = self
            .fetcher
            .fetch_json(&url)
            .await
            .map(|data| parsers::parse_routes(&data));

        let catalog = Operation::ListRoutes.resolve(result, RouteCatalog::default)?;
        debug!(routes = catalog.routes.len(), "Routes fetched");
        Ok(catalog)
    }

    #[instrument(skip(self))]
    async fn list_departures(&self, stop_id: IdValue) -> Result<Vec<Departure>, MyStopError> {
        let base_url = self.require_base_url()?;
        let stop_id = normalize_numeric_id(stop_id, "stop_id")?;
        let url = base_url.rest_endpoint(&format!("StopDepartures/Get/{stop_id}"));

        let result = self.fetch_departures(&url).await;
        let departures = Operation::ListDepartures.resolve(result, Vec::new)?;
        debug!(%stop_id, count = departures.len(), "Departures fetched");
        Ok(departures)
    }

    #[instrument(skip(self))]
    async fn stop_name(&self, stop_id: IdValue) -> Result<String, MyStopError> {
        let base_url = self.require_base_url()?;
        let stop_id = normalize_numeric_id(stop_id, "stop_id")?;
        let url = base_url.rest_endpoint(&format!("Stops/Get/{stop_id}"));

        let result = self
            .fetcher
            .fetch_json(&url)
            .await
            .map(|data| parsers::parse_stop_name(&data, &stop_id));

        Operation::GetStopName.resolve(result, || stop_id.to_string())
    }

    #[instrument(skip(self))]
    async fn list_alerts(&self) -> Result<Vec<Alert>, MyStopError> {
        let url = self
            .require_base_url()?
            .rest_endpoint("PublicMessages/GetCurrentMessages");
        let result = self
            .fetcher
            .fetch_json(&url)
            .await
            .map(|data| parsers::parse_alerts(&data));

        let alerts = Operation::ListAlerts.resolve(result, Vec::new)?;
        debug!(count = alerts.len(), "Alerts fetched");
        Ok(alerts)
    }

    #[instrument(skip(self))]
    async fn list_route_alerts(&self, route_id: IdValue) -> Result<Vec<Alert>, MyStopError> {
        let base_url = self.require_base_url()?;
        let route_id = normalize_numeric_id(route_id, "route_id")?;
        let url = base_url.rest_endpoint(&format!("RouteDetails/Get/{route_id}"));

        let result = self
            .fetcher
            .fetch_json(&url)
            .await
            .map(|data| parsers::parse_route_alerts(&data));

        let alerts = Operation::ListRouteAlerts.resolve(result, Vec::new)?;
        debug!(%route_id, count = alerts.len(), "Route alerts fetched");
        Ok(alerts)
    }
}
