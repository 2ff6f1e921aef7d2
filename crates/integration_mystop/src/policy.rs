//! Per-operation error propagation
//!
//! Polling paths prefer an empty result over a failure, while route
//! listing is a setup-time call whose failure the host must see. The table
//! in [`Operation::policy`] is the only place that decision is made.

use std::fmt;

use tracing::{error, warn};

use crate::error::MyStopError;

/// What happens to an internal failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Log and return the error
    Propagate,
    /// Log and return an empty result
    SuppressToEmpty,
    /// Return an operation-specific fallback value
    SuppressToFallback,
}

/// Client operations subject to the policy table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Agency discovery
    DiscoverAgencies,
    /// Route and stop topology
    ListRoutes,
    /// Live departures for a stop
    ListDepartures,
    /// Stop display name
    GetStopName,
    /// Agency-wide alerts
    ListAlerts,
    /// Alerts for one route
    ListRouteAlerts,
}

impl Operation {
    /// The propagation policy for this operation
    #[must_use]
    pub const fn policy(self) -> ErrorPolicy {
        match self {
            Self::ListRoutes => ErrorPolicy::Propagate,
            Self::DiscoverAgencies
            | Self::ListDepartures
            | Self::ListAlerts
            | Self::ListRouteAlerts => ErrorPolicy::SuppressToEmpty,
            Self::GetStopName => ErrorPolicy::SuppressToFallback,
        }
    }

    /// Stable name used in log fields
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DiscoverAgencies => "discover_agencies",
            Self::ListRoutes => "list_routes",
            Self::ListDepartures => "list_departures",
            Self::GetStopName => "stop_name",
            Self::ListAlerts => "list_alerts",
            Self::ListRouteAlerts => "list_route_alerts",
        }
    }

    /// Apply this operation's policy to a result
    ///
    /// `fallback` is only called for [`ErrorPolicy::SuppressToFallback`].
    ///
    /// # Errors
    ///
    /// Returns the error for [`ErrorPolicy::Propagate`] and always for
    /// [`MyStopError::InvalidConfig`].
    pub fn resolve<T, F>(self, result: Result<T, MyStopError>, fallback: F) -> Result<T, MyStopError>
    where
        T: Default,
        F: FnOnce() -> T,
    {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_invalid_config() => return Err(err),
            Err(err) => err,
        };

        match self.policy() {
            ErrorPolicy::Propagate => {
                error!(operation = self.name(), error = %err, "Request failed");
                Err(err)
            },
            ErrorPolicy::SuppressToEmpty => {
                error!(operation = self.name(), error = %err, "Request failed, returning empty result");
                Ok(T::default())
            },
            ErrorPolicy::SuppressToFallback => {
                warn!(operation = self.name(), error = %err, "Request failed, using fallback");
                Ok(fallback())
            },
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        assert_eq!(Operation::ListRoutes.policy(), ErrorPolicy::Propagate);
        assert_eq!(Operation::DiscoverAgencies.policy(), ErrorPolicy::SuppressToEmpty);
        assert_eq!(Operation::ListDepartures.policy(), ErrorPolicy::SuppressToEmpty);
        assert_eq!(Operation::ListAlerts.policy(), ErrorPolicy::SuppressToEmpty);
        assert_eq!(Operation::ListRouteAlerts.policy(), ErrorPolicy::SuppressToEmpty);
        assert_eq!(Operation::GetStopName.policy(), ErrorPolicy::SuppressToFallback);
    }

    #[test]
    fn test_suppress_to_empty() {
        let result: Result<Vec<u8>, _> = Operation::ListDepartures
            .resolve(Err(MyStopError::HttpStatus { status: 502 }), Vec::new);
        assert!(result.unwrap().is_empty());
    }

    #[test]
    fn test_propagate() {
        let result: Result<Vec<u8>, _> = Operation::ListRoutes
            .resolve(Err(MyStopError::Timeout(crate::error::TimeoutPhase::Response)), Vec::new);
        assert!(matches!(result, Err(MyStopError::Timeout(_))));
    }

    #[test]
    fn test_fallback_value() {
        let result = Operation::GetStopName.resolve(
            Err(MyStopError::DecodeError("bad".to_string())),
            || "42".to_string(),
        );
        assert_eq!(result.unwrap(), "42");
    }

    #[test]
    fn test_invalid_config_always_propagates() {
        for op in [
            Operation::DiscoverAgencies,
            Operation::ListDepartures,
            Operation::GetStopName,
            Operation::ListAlerts,
        ] {
            let result: Result<String, _> = op.resolve(
                Err(MyStopError::InvalidConfig("base_url is required".to_string())),
                || "fallback".to_string(),
            );
            assert!(result.unwrap_err().is_invalid_config());
        }
    }

    #[test]
    fn test_ok_passes_through() {
        let result = Operation::ListRoutes.resolve(Ok(3_u8), || 0);
        assert_eq!(result.unwrap(), 3);
    }
}
