//! Avail MyStop integration
//!
//! Polling client for the Avail MyStop family of REST endpoints used by
//! transit agencies for real-time arrivals and rider alerts. It discovers
//! agencies, fetches route and stop topology, and normalizes live departures
//! and service alerts into one shape whether the agency answers in JSON or
//! in legacy XML.
//!
//! # Architecture
//!
//! [`MyStopClient`] defines the operations, implemented by [`AvailClient`].
//! Requests go through an [`HttpFetcher`] that applies the composite
//! timeout and bounded retry; responses are decoded by [`decode_payload`]
//! and flattened by the pure functions in [`parsers`]. Which failures reach
//! the caller is decided by the [`Operation::policy`] table.
//!
//! # Example
//!
//! ```rust,ignore
//! use integration_mystop::{AvailClient, MyStopClient, MyStopConfig};
//!
//! let config = MyStopConfig::for_agency("https://myride.example.org/InfoPoint");
//! let client = AvailClient::new(&config)?;
//!
//! for departure in client.list_departures(101.into()).await? {
//!     println!("{} {:?}", departure.destination, departure.eta);
//! }
//! ```

mod client;
mod config;
pub mod decoder;
mod error;
mod fetcher;
mod models;
pub mod parsers;
mod policy;
pub mod retry;
mod validation;

pub use client::{AvailClient, MyStopClient};
pub use config::{DISCOVERY_URL, MyStopConfig, TimeoutPolicy};
pub use decoder::{DecodedPayload, XmlElement, decode_payload, strip_namespace_declarations};
pub use error::{ErrorKind, MyStopError, TimeoutPhase};
pub use fetcher::{HttpFetcher, HttpTransport, ReqwestTransport};
pub use models::{AgencyDirectory, Alert, Departure, RouteCatalog, RouteMap, StopMap};
pub use policy::{ErrorPolicy, Operation};
pub use retry::RetryPolicy;
pub use validation::{BaseUrl, IdValue, NumericId, normalize_base_url, normalize_numeric_id};
