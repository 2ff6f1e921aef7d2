//! CLI configuration
//!
//! Layered loading: built-in defaults, then an optional TOML file, then
//! `MYSTOP_*` environment variables (`__` separates nested keys, e.g.
//! `MYSTOP_CLIENT__BASE_URL`). Command-line flags are applied last by the
//! caller.

use std::path::Path;

use application::PollSchedule;
use integration_mystop::{DISCOVERY_URL, MyStopConfig};
use serde::{Deserialize, Serialize};

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "MYSTOP";

/// Config file looked up in the working directory when none is given
const DEFAULT_CONFIG_FILE: &str = "mystop";

/// Agency name shown when neither config nor flags provide one
pub const DEFAULT_AGENCY_NAME: &str = "MyStop";

/// Effective CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Client settings
    #[serde(default)]
    pub client: MyStopConfig,

    /// Polling cadences for `watch`
    #[serde(default)]
    pub polling: PollSchedule,

    /// Agency display name used in sensor ids and titles
    #[serde(default)]
    pub agency_name: Option<String>,
}

impl CliConfig {
    /// Load configuration from `path` (or `mystop.toml` if present) and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing or any source cannot
    /// be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = config::Config::builder()
            .set_default("client.discovery_url", DISCOVERY_URL)?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Apply a `--base-url` flag
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if base_url.is_some() {
            self.client.base_url = base_url;
        }
        self
    }

    /// Agency display name, falling back to [`DEFAULT_AGENCY_NAME`]
    #[must_use]
    pub fn agency_name(&self) -> &str {
        self.agency_name.as_deref().unwrap_or(DEFAULT_AGENCY_NAME)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        self.client.validate()?;
        self.polling.validate().map_err(|e| e.to_string())
    }
}
