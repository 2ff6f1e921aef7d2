//! Stop selection flow
//!
//! A host walks a user through agency, route, and stop selection, with a
//! manual entry form as the escape hatch whenever discovery or the route
//! listing comes up empty. The flow is a value: each call to
//! [`SetupFlow::advance`] consumes it and returns the next one, whose
//! [`SetupStep`] tells the host what to show.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use integration_mystop::{
    AgencyDirectory, AvailClient, DISCOVERY_URL, IdValue, MyStopClient, MyStopError, RouteCatalog,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::ApplicationError;
use crate::presentation::{sort_route_labels, stop_clean_name};

/// Choice that leads to the manual entry form
pub const MANUAL_ENTRY: &str = "Manual Entry";

/// Builds clients for a base URL chosen during setup
pub trait ClientFactory: Send + Sync {
    /// Create a client bound to `base_url` (or to no agency)
    fn client(&self, base_url: Option<&str>) -> Result<Arc<dyn MyStopClient>, MyStopError>;
}

/// Factory deriving agency clients from one template client
///
/// All derived clients share the template's connection pool.
#[derive(Debug, Clone)]
pub struct AvailClientFactory {
    template: AvailClient,
}

impl AvailClientFactory {
    /// Create a factory from a template client
    #[must_use]
    pub const fn new(template: AvailClient) -> Self {
        Self { template }
    }
}

impl ClientFactory for AvailClientFactory {
    fn client(&self, base_url: Option<&str>) -> Result<Arc<dyn MyStopClient>, MyStopError> {
        let client = self.template.with_base_url(base_url)?;
        Ok(Arc::new(client))
    }
}

/// Everything the flow needs from its host
#[derive(Clone)]
pub struct SetupContext {
    factory: Arc<dyn ClientFactory>,
    discovery_url: String,
    configured_ids: HashSet<String>,
}

impl fmt::Debug for SetupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupContext")
            .field("factory", &"dyn ClientFactory")
            .field("discovery_url", &self.discovery_url)
            .field("configured_ids", &self.configured_ids)
            .finish()
    }
}

impl SetupContext {
    /// Create a context using the public discovery endpoint
    #[must_use]
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            discovery_url: DISCOVERY_URL.to_string(),
            configured_ids: HashSet::new(),
        }
    }

    /// Use a different discovery endpoint
    #[must_use]
    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = url.into();
        self
    }

    /// Unique ids of stops the host already monitors
    #[must_use]
    pub fn with_configured_ids(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.configured_ids = ids.into_iter().collect();
        self
    }

    /// Fail if `unique_id` is already configured
    pub fn ensure_unique(&self, unique_id: &str) -> Result<(), ApplicationError> {
        if self.configured_ids.contains(unique_id) {
            Err(ApplicationError::AlreadyConfigured(unique_id.to_string()))
        } else {
            Ok(())
        }
    }
}

/// A configured stop, as persisted by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupEntry {
    /// Agency display name
    pub agency_name: String,
    /// Normalized agency base URL
    pub base_url: String,
    /// Stop id
    pub stop_id: String,
    /// Stop display name
    pub stop_name: String,
    /// Route the stop was selected through, if any
    #[serde(default)]
    pub route_id: Option<String>,
    /// Label of that route
    #[serde(default)]
    pub route_name: Option<String>,
}

impl SetupEntry {
    /// `"{base_url}_{stop_id}"`, unique per monitored stop
    #[must_use]
    pub fn unique_id(&self) -> String {
        format!("{}_{}", self.base_url, self.stop_id)
    }

    /// `"{agency} - {stop name}"`
    #[must_use]
    pub fn title(&self) -> String {
        format!("{} - {}", self.agency_name, self.stop_name)
    }
}

/// Error shown on a redisplayed form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupErrorCode {
    /// The submitted choice is not offered
    Unknown,
    /// The agency could not be reached for the submitted stop
    CannotConnect,
}

impl SetupErrorCode {
    /// Stable code for host translations
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::CannotConnect => "cannot_connect",
        }
    }
}

/// Why the flow ended without an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The selected stop is already monitored
    AlreadyConfigured(String),
}

/// Prefilled values of the manual entry form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualDefaults {
    /// Agency name chosen earlier, if any
    pub agency_name: Option<String>,
    /// Base URL chosen earlier, if any
    pub base_url: Option<String>,
}

/// What the host should show next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupStep {
    /// Pick an agency; [`MANUAL_ENTRY`] comes first
    SelectAgency {
        /// Agency names
        choices: Vec<String>,
    },
    /// Pick a route of the selected agency
    SelectRoute {
        /// Selected agency name
        agency: Option<String>,
        /// Route labels, numeric routes first
        choices: Vec<String>,
        /// Error from the previous submission
        error: Option<SetupErrorCode>,
    },
    /// Pick a stop of the selected route
    SelectStop {
        /// Selected route id
        route_id: String,
        /// Stop labels, sorted
        choices: Vec<String>,
    },
    /// Enter agency, base URL, and stop id by hand
    ManualEntry {
        /// Prefilled values
        defaults: ManualDefaults,
        /// Error from the previous submission
        error: Option<SetupErrorCode>,
    },
    /// Finished with a new entry
    Complete {
        /// Entry title
        title: String,
        /// The configured stop
        entry: SetupEntry,
    },
    /// Finished without an entry
    Aborted(AbortReason),
}

/// A submission for the current step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupInput {
    /// Agency name or [`MANUAL_ENTRY`]
    Agency(String),
    /// Route label
    Route(String),
    /// Stop label
    Stop(String),
    /// Manual entry form
    Manual {
        /// Agency display name
        agency_name: String,
        /// Agency base URL
        base_url: String,
        /// Stop id
        stop_id: String,
    },
}

/// Values accumulated across steps
#[derive(Debug, Clone, Default)]
struct SetupState {
    agencies: AgencyDirectory,
    agency: Option<String>,
    base_url: Option<String>,
    route_id: Option<String>,
    route_name: Option<String>,
    catalog: RouteCatalog,
}

/// The setup state machine
#[derive(Debug, Clone)]
pub struct SetupFlow {
    state: SetupState,
    step: SetupStep,
}

impl Default for SetupFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupFlow {
    /// A flow positioned before agency selection
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SetupState::default(),
            step: SetupStep::SelectAgency { choices: Vec::new() },
        }
    }

    /// Create a flow and run its first step
    pub async fn start(ctx: &SetupContext) -> Self {
        Self::new().advance(None, ctx).await
    }

    /// The step the host should show
    #[must_use]
    pub const fn step(&self) -> &SetupStep {
        &self.step
    }

    /// Whether the flow has completed or aborted
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        matches!(self.step, SetupStep::Complete { .. } | SetupStep::Aborted(_))
    }

    /// Submit `input` to the current step, or redisplay it with `None`
    ///
    /// Input meant for a different step is ignored. A finished flow stays
    /// finished.
    #[instrument(skip(self, ctx))]
    pub async fn advance(mut self, input: Option<SetupInput>, ctx: &SetupContext) -> Self {
        let step = match self.step {
            SetupStep::Complete { .. } | SetupStep::Aborted(_) => return self,
            SetupStep::SelectAgency { .. } => {
                let selection = match input {
                    Some(SetupInput::Agency(name)) => Some(name),
                    _ => None,
                };
                self.select_agency(selection, ctx).await
            },
            SetupStep::SelectRoute { .. } => {
                let selection = match input {
                    Some(SetupInput::Route(label)) => Some(label),
                    _ => None,
                };
                self.select_route(selection, ctx).await
            },
            SetupStep::SelectStop { .. } => {
                let selection = match input {
                    Some(SetupInput::Stop(label)) => Some(label),
                    _ => None,
                };
                self.select_stop(selection, ctx)
            },
            SetupStep::ManualEntry { .. } => match input {
                Some(SetupInput::Manual {
                    agency_name,
                    base_url,
                    stop_id,
                }) => self.submit_manual(agency_name, base_url, stop_id, ctx).await,
                _ => self.manual_form(None),
            },
        };

        self.step = step;
        self
    }

    async fn select_agency(&mut self, selection: Option<String>, ctx: &SetupContext) -> SetupStep {
        if let Some(selection) = selection {
            if selection == MANUAL_ENTRY {
                return self.manual_form(None);
            }
            if let Some(base_url) = self.state.agencies.get(&selection) {
                self.state.base_url = Some(base_url.to_string());
                self.state.agency = Some(selection);
                return self.select_route(None, ctx).await;
            }
        }

        if self.state.agencies.is_empty() {
            self.state.agencies = match ctx.factory.client(None) {
                Ok(client) => client.discover_agencies(&ctx.discovery_url).await,
                Err(err) => {
                    warn!(error = %err, "Could not create discovery client");
                    AgencyDirectory::new()
                },
            };
        }

        if self.state.agencies.is_empty() {
            info!("No agencies discovered, switching to manual entry");
            return self.manual_form(None);
        }

        let mut choices = Vec::with_capacity(self.state.agencies.len() + 1);
        choices.push(MANUAL_ENTRY.to_string());
        choices.extend(self.state.agencies.keys().cloned());
        SetupStep::SelectAgency { choices }
    }

    async fn select_route(&mut self, selection: Option<String>, ctx: &SetupContext) -> SetupStep {
        let mut error = None;

        if let Some(label) = selection {
            if let Some(route_id) = self.state.catalog.route_id(&label) {
                self.state.route_id = Some(route_id.to_string());
                self.state.route_name = Some(label);
                return self.select_stop(None, ctx);
            }
            error = Some(SetupErrorCode::Unknown);
        }

        if self.state.catalog.is_empty() {
            match self.fetch_catalog(ctx).await {
                Ok(catalog) => self.state.catalog = catalog,
                Err(err) => {
                    warn!(error = %err, "Could not list routes, switching to manual entry");
                    return self.manual_form(None);
                },
            }
        }

        if self.state.catalog.is_empty() {
            info!("Agency lists no routes, switching to manual entry");
            return self.manual_form(None);
        }

        SetupStep::SelectRoute {
            agency: self.state.agency.clone(),
            choices: sort_route_labels(self.state.catalog.routes.keys()),
            error,
        }
    }

    async fn fetch_catalog(&self, ctx: &SetupContext) -> Result<RouteCatalog, MyStopError> {
        let client = ctx.factory.client(self.state.base_url.as_deref())?;
        client.list_routes().await
    }

    fn select_stop(&self, selection: Option<String>, ctx: &SetupContext) -> SetupStep {
        let route_id = self.state.route_id.clone().unwrap_or_default();
        let stops = self.state.catalog.stops_for(&route_id);

        if let Some(label) = selection {
            // Stops listed without an id cannot be monitored
            let stop_id = stops
                .and_then(|stops| stops.get(&label))
                .filter(|id| !id.is_empty());
            if let Some(stop_id) = stop_id {
                let entry = SetupEntry {
                    agency_name: self.state.agency.clone().unwrap_or_default(),
                    base_url: self.state.base_url.clone().unwrap_or_default(),
                    stop_id: stop_id.clone(),
                    stop_name: stop_clean_name(&label).to_string(),
                    route_id: Some(route_id),
                    route_name: self.state.route_name.clone(),
                };
                return complete(entry, ctx);
            }
            debug!(%label, "Unknown stop selected");
        }

        SetupStep::SelectStop {
            choices: stops.map(|stops| stops.keys().cloned().collect()).unwrap_or_default(),
            route_id,
        }
    }

    fn manual_form(&self, error: Option<SetupErrorCode>) -> SetupStep {
        SetupStep::ManualEntry {
            defaults: ManualDefaults {
                agency_name: self.state.agency.clone(),
                base_url: self.state.base_url.clone(),
            },
            error,
        }
    }

    async fn submit_manual(
        &self,
        agency_name: String,
        base_url: String,
        stop_id: String,
        ctx: &SetupContext,
    ) -> SetupStep {
        match verify_manual_stop(&base_url, &stop_id, ctx).await {
            Ok((base_url, stop_name)) => complete(
                SetupEntry {
                    agency_name,
                    base_url,
                    stop_id,
                    stop_name,
                    route_id: None,
                    route_name: None,
                },
                ctx,
            ),
            Err(err) => {
                warn!(error = %err, %base_url, %stop_id, "Manual stop could not be verified");
                self.manual_form(Some(SetupErrorCode::CannotConnect))
            },
        }
    }
}

/// Look up a manually entered stop at the agency
///
/// Returns the normalized base URL and the stop's display name.
async fn verify_manual_stop(
    base_url: &str,
    stop_id: &str,
    ctx: &SetupContext,
) -> Result<(String, String), MyStopError> {
    let client = ctx.factory.client(Some(base_url))?;
    client.list_departures(IdValue::from(stop_id)).await?;
    let stop_name = client.stop_name(IdValue::from(stop_id)).await?;

    let normalized = integration_mystop::normalize_base_url(Some(base_url))?
        .map(|url| url.to_string())
        .ok_or_else(|| MyStopError::InvalidConfig("base_url is required".to_string()))?;
    Ok((normalized, stop_name))
}

fn complete(entry: SetupEntry, ctx: &SetupContext) -> SetupStep {
    let unique_id = entry.unique_id();
    if let Err(err) = ctx.ensure_unique(&unique_id) {
        info!(error = %err, "Stop already configured");
        return SetupStep::Aborted(AbortReason::AlreadyConfigured(unique_id));
    }

    info!(%unique_id, "Stop configured");
    SetupStep::Complete {
        title: entry.title(),
        entry,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use integration_mystop::BaseUrl;

    use super::*;
    use crate::testing::MockClient;

    /// Hands out the same mock for every base URL
    struct SharedFactory(Arc<MockClient>);

    impl ClientFactory for SharedFactory {
        fn client(&self, base_url: Option<&str>) -> Result<Arc<dyn MyStopClient>, MyStopError> {
            integration_mystop::normalize_base_url(base_url)?;
            Ok(self.0.clone())
        }
    }

    fn context(client: MockClient) -> SetupContext {
        SetupContext::new(Arc::new(SharedFactory(Arc::new(client))))
    }

    fn agencies() -> AgencyDirectory {
        let mut agencies = BTreeMap::new();
        agencies.insert(
            "Zeta Transit".to_string(),
            BaseUrl::parse("https://zeta.example.com").unwrap(),
        );
        agencies.insert(
            "Alpha Bus".to_string(),
            BaseUrl::parse("https://alpha.example.com/InfoPoint").unwrap(),
        );
        agencies
    }

    fn catalog() -> RouteCatalog {
        let mut catalog = RouteCatalog::default();
        catalog.routes.insert("10 - Crosstown".to_string(), "10".to_string());
        catalog.routes.insert("2 - Main St".to_string(), "2".to_string());
        catalog.stops.insert(
            "2".to_string(),
            BTreeMap::from([
                ("Main & 2nd (202)".to_string(), "202".to_string()),
                ("Main & 1st (201)".to_string(), "201".to_string()),
                ("Depot".to_string(), String::new()),
            ]),
        );
        catalog.stops.insert("10".to_string(), BTreeMap::new());
        catalog
    }

    #[tokio::test]
    async fn test_agency_choices_manual_first() {
        let mut client = MockClient::new();
        client.expect_discover_agencies().times(1).returning(|_| agencies());
        let ctx = context(client);

        let flow = SetupFlow::start(&ctx).await;
        assert_eq!(
            flow.step(),
            &SetupStep::SelectAgency {
                choices: vec![
                    "Manual Entry".to_string(),
                    "Alpha Bus".to_string(),
                    "Zeta Transit".to_string()
                ]
            }
        );

        // Discovery is cached across redisplays
        let flow = flow.advance(Some(SetupInput::Agency("Nope".to_string())), &ctx).await;
        assert!(matches!(flow.step(), SetupStep::SelectAgency { .. }));
    }

    #[tokio::test]
    async fn test_custom_discovery_url() {
        let mut client = MockClient::new();
        client
            .expect_discover_agencies()
            .withf(|url| url == "https://gateway.example.com/TransitAuthorities")
            .times(1)
            .returning(|_| agencies());
        let ctx = context(client).with_discovery_url("https://gateway.example.com/TransitAuthorities");

        let flow = SetupFlow::start(&ctx).await;
        assert!(matches!(flow.step(), SetupStep::SelectAgency { choices } if choices.len() == 3));
    }

    #[tokio::test]
    async fn test_empty_discovery_goes_manual() {
        let mut client = MockClient::new();
        client.expect_discover_agencies().returning(|_| AgencyDirectory::new());
        let ctx = context(client);

        let flow = SetupFlow::start(&ctx).await;
        assert_eq!(
            flow.step(),
            &SetupStep::ManualEntry {
                defaults: ManualDefaults::default(),
                error: None
            }
        );
    }

    #[tokio::test]
    async fn test_full_selection_path() {
        let mut client = MockClient::new();
        client.expect_discover_agencies().returning(|_| agencies());
        client.expect_list_routes().times(1).returning(|| Ok(catalog()));
        let ctx = context(client);

        let flow = SetupFlow::start(&ctx).await;
        let flow = flow.advance(Some(SetupInput::Agency("Alpha Bus".to_string())), &ctx).await;
        assert_eq!(
            flow.step(),
            &SetupStep::SelectRoute {
                agency: Some("Alpha Bus".to_string()),
                choices: vec!["2 - Main St".to_string(), "10 - Crosstown".to_string()],
                error: None,
            }
        );

        let flow = flow.advance(Some(SetupInput::Route("Bogus".to_string())), &ctx).await;
        assert!(matches!(
            flow.step(),
            SetupStep::SelectRoute { error: Some(SetupErrorCode::Unknown), .. }
        ));

        let flow = flow.advance(Some(SetupInput::Route("2 - Main St".to_string())), &ctx).await;
        assert_eq!(
            flow.step(),
            &SetupStep::SelectStop {
                route_id: "2".to_string(),
                choices: vec![
                    "Depot".to_string(),
                    "Main & 1st (201)".to_string(),
                    "Main & 2nd (202)".to_string()
                ],
            }
        );

        let flow = flow.advance(Some(SetupInput::Stop("Depot".to_string())), &ctx).await;
        assert!(matches!(flow.step(), SetupStep::SelectStop { .. }));

        let flow = flow.advance(Some(SetupInput::Stop("Main & 2nd (202)".to_string())), &ctx).await;
        let SetupStep::Complete { title, entry } = flow.step() else {
            panic!("expected completion, got {:?}", flow.step());
        };
        assert_eq!(title, "Alpha Bus - Main & 2nd");
        assert_eq!(entry.unique_id(), "https://alpha.example.com/InfoPoint_202");
        assert_eq!(entry.route_id.as_deref(), Some("2"));
        assert_eq!(entry.route_name.as_deref(), Some("2 - Main St"));
        assert!(flow.is_finished());
    }

    #[tokio::test]
    async fn test_already_configured_aborts() {
        let mut client = MockClient::new();
        client.expect_discover_agencies().returning(|_| agencies());
        client.expect_list_routes().returning(|| Ok(catalog()));
        let ctx = context(client)
            .with_configured_ids(["https://alpha.example.com/InfoPoint_201".to_string()]);

        let flow = SetupFlow::start(&ctx).await;
        let flow = flow.advance(Some(SetupInput::Agency("Alpha Bus".to_string())), &ctx).await;
        let flow = flow.advance(Some(SetupInput::Route("2 - Main St".to_string())), &ctx).await;
        let flow = flow.advance(Some(SetupInput::Stop("Main & 1st (201)".to_string())), &ctx).await;

        assert_eq!(
            flow.step(),
            &SetupStep::Aborted(AbortReason::AlreadyConfigured(
                "https://alpha.example.com/InfoPoint_201".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_route_failure_goes_manual_with_defaults() {
        let mut client = MockClient::new();
        client.expect_discover_agencies().returning(|_| agencies());
        client
            .expect_list_routes()
            .returning(|| Err(MyStopError::HttpStatus { status: 500 }));
        let ctx = context(client);

        let flow = SetupFlow::start(&ctx).await;
        let flow = flow.advance(Some(SetupInput::Agency("Zeta Transit".to_string())), &ctx).await;
        assert_eq!(
            flow.step(),
            &SetupStep::ManualEntry {
                defaults: ManualDefaults {
                    agency_name: Some("Zeta Transit".to_string()),
                    base_url: Some("https://zeta.example.com".to_string()),
                },
                error: None,
            }
        );
    }

    #[tokio::test]
    async fn test_manual_entry_success() {
        let mut client = MockClient::new();
        client.expect_discover_agencies().returning(|_| agencies());
        client.expect_list_departures().times(1).returning(|_| Ok(Vec::new()));
        client
            .expect_stop_name()
            .times(1)
            .returning(|_| Ok("Transit Center".to_string()));
        let ctx = context(client);

        let flow = SetupFlow::start(&ctx).await;
        let flow = flow.advance(Some(SetupInput::Agency(MANUAL_ENTRY.to_string())), &ctx).await;
        assert!(matches!(flow.step(), SetupStep::ManualEntry { error: None, .. }));

        let flow = flow
            .advance(
                Some(SetupInput::Manual {
                    agency_name: "Metro".to_string(),
                    base_url: "https://metro.example.com/".to_string(),
                    stop_id: "42".to_string(),
                }),
                &ctx,
            )
            .await;

        let SetupStep::Complete { title, entry } = flow.step() else {
            panic!("expected completion, got {:?}", flow.step());
        };
        assert_eq!(title, "Metro - Transit Center");
        assert_eq!(entry.base_url, "https://metro.example.com");
        assert_eq!(entry.unique_id(), "https://metro.example.com_42");
        assert!(entry.route_id.is_none());
    }

    #[tokio::test]
    async fn test_manual_entry_errors_redisplay() {
        let mut client = MockClient::new();
        client.expect_discover_agencies().returning(|_| AgencyDirectory::new());
        client
            .expect_list_departures()
            .returning(|_| Err(MyStopError::InvalidConfig("stop_id must be a numeric id".to_string())));
        let ctx = context(client);

        let flow = SetupFlow::start(&ctx).await;
        let flow = flow
            .advance(
                Some(SetupInput::Manual {
                    agency_name: "Metro".to_string(),
                    base_url: "https://metro.example.com".to_string(),
                    stop_id: "abc".to_string(),
                }),
                &ctx,
            )
            .await;
        assert!(matches!(
            flow.step(),
            SetupStep::ManualEntry { error: Some(SetupErrorCode::CannotConnect), .. }
        ));

        let flow = flow
            .advance(
                Some(SetupInput::Manual {
                    agency_name: "Metro".to_string(),
                    base_url: "ftp://metro.example.com".to_string(),
                    stop_id: "1".to_string(),
                }),
                &ctx,
            )
            .await;
        assert!(matches!(
            flow.step(),
            SetupStep::ManualEntry { error: Some(SetupErrorCode::CannotConnect), .. }
        ));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(SetupErrorCode::Unknown.as_str(), "unknown");
        assert_eq!(SetupErrorCode::CannotConnect.as_str(), "cannot_connect");
    }

    #[test]
    fn test_factory_rejects_bad_url() {
        let template = AvailClient::new(&integration_mystop::MyStopConfig::for_testing()).unwrap();
        let factory = AvailClientFactory::new(template);
        assert!(factory.client(Some("https://agency.example.com")).is_ok());
        assert!(factory.client(Some("not a url")).is_err());
    }
}
