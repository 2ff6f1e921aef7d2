//! Test doubles shared by the application modules

use async_trait::async_trait;
use integration_mystop::{
    AgencyDirectory, Alert, Departure, IdValue, MyStopClient, MyStopError, RouteCatalog,
};
use mockall::mock;

mock! {
    pub Client {}

    #[async_trait]
    impl MyStopClient for Client {
        async fn discover_agencies(&self, discovery_url: &str) -> AgencyDirectory;
        async fn list_routes(&self) -> Result<RouteCatalog, MyStopError>;
        async fn list_departures(&self, stop_id: IdValue) -> Result<Vec<Departure>, MyStopError>;
        async fn stop_name(&self, stop_id: IdValue) -> Result<String, MyStopError>;
        async fn list_alerts(&self) -> Result<Vec<Alert>, MyStopError>;
        async fn list_route_alerts(&self, route_id: IdValue) -> Result<Vec<Alert>, MyStopError>;
    }
}
