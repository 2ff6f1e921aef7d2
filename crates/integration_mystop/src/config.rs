//! MyStop client configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::validation::normalize_base_url;

/// Central endpoint listing every agency that exposes a MyStop REST API
pub const DISCOVERY_URL: &str = "https://mobilegateway.rideralerts.com/gateway/TransitAuthorities";

/// Composite request timeout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPolicy {
    /// Overall request timeout in seconds
    #[serde(default = "default_total_secs")]
    pub total_secs: u64,

    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    /// Socket read timeout in seconds
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,
}

const fn default_total_secs() -> u64 {
    30
}

const fn default_connect_secs() -> u64 {
    10
}

const fn default_read_secs() -> u64 {
    20
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            total_secs: default_total_secs(),
            connect_secs: default_connect_secs(),
            read_secs: default_read_secs(),
        }
    }
}

impl TimeoutPolicy {
    /// Overall timeout as a `Duration`
    #[must_use]
    pub const fn total(&self) -> Duration {
        Duration::from_secs(self.total_secs)
    }

    /// Connect timeout as a `Duration`
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    /// Read timeout as a `Duration`
    #[must_use]
    pub const fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }
}

/// Configuration for an Avail MyStop client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MyStopConfig {
    /// Agency base URL (absent for discovery-only use)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Agency discovery endpoint
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,

    /// Request timeouts
    #[serde(default)]
    pub timeout: TimeoutPolicy,

    /// Retry behavior for transport failures
    #[serde(default)]
    pub retry: RetryPolicy,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_discovery_url() -> String {
    DISCOVERY_URL.to_string()
}

fn default_user_agent() -> String {
    format!("mystop-rs/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for MyStopConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            discovery_url: default_discovery_url(),
            timeout: TimeoutPolicy::default(),
            retry: RetryPolicy::default(),
            user_agent: default_user_agent(),
        }
    }
}

impl MyStopConfig {
    /// Configuration for a specific agency
    #[must_use]
    pub fn for_agency(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }

    /// Create a configuration suitable for testing
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            timeout: TimeoutPolicy {
                total_secs: 5,
                connect_secs: 2,
                read_secs: 3,
            },
            retry: RetryPolicy::new(10, 100, 2.0, 2),
            ..Default::default()
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        normalize_base_url(self.base_url.as_deref()).map_err(|e| e.to_string())?;

        if self.discovery_url.is_empty() {
            return Err("discovery_url must not be empty".to_string());
        }

        if self.timeout.total_secs == 0 {
            return Err("timeout.total_secs must be greater than 0".to_string());
        }

        if self.timeout.connect_secs > self.timeout.total_secs
            || self.timeout.read_secs > self.timeout.total_secs
        {
            return Err("connect and read timeouts must not exceed the total timeout".to_string());
        }

        if self.retry.multiplier < 1.0 {
            return Err("retry.multiplier must be at least 1.0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MyStopConfig::default();
        assert!(config.base_url.is_none());
        assert_eq!(config.discovery_url, DISCOVERY_URL);
        assert_eq!(config.timeout.total_secs, 30);
        assert_eq!(config.timeout.connect_secs, 10);
        assert_eq!(config.timeout.read_secs, 20);
        assert_eq!(config.retry.max_attempts(), 3);
        assert!(config.user_agent.starts_with("mystop-rs/"));
    }

    #[test]
    fn test_for_agency() {
        let config = MyStopConfig::for_agency("https://agency.example.com");
        assert_eq!(config.base_url.as_deref(), Some("https://agency.example.com"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_base_url() {
        let config = MyStopConfig::for_agency("ftp://agency.example.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let config = MyStopConfig {
            timeout: TimeoutPolicy {
                total_secs: 0,
                connect_secs: 0,
                read_secs: 0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_connect_exceeds_total() {
        let config = MyStopConfig {
            timeout: TimeoutPolicy {
                total_secs: 5,
                connect_secs: 10,
                read_secs: 2,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: MyStopConfig =
            serde_json::from_str(r#"{"base_url":"https://a.example.com","timeout":{"total_secs":15}}"#)
                .unwrap();
        assert_eq!(config.timeout.total_secs, 15);
        assert_eq!(config.timeout.connect_secs, 10);
        assert_eq!(config.discovery_url, DISCOVERY_URL);
    }

    #[test]
    fn test_timeout_durations() {
        let timeout = TimeoutPolicy::default();
        assert_eq!(timeout.total(), Duration::from_secs(30));
        assert_eq!(timeout.connect(), Duration::from_secs(10));
        assert_eq!(timeout.read(), Duration::from_secs(20));
    }
}
