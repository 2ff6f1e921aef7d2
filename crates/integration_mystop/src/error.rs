//! MyStop error types

use std::fmt;

use thiserror::Error;

/// Errors that can occur while talking to an Avail MyStop endpoint
#[derive(Debug, Error)]
pub enum MyStopError {
    /// Malformed base URL, malformed identifier, or missing base URL
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Transport-level failure (DNS, connect, reset, body read)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// One of the connect, read, or overall limits elapsed
    #[error("Request timed out {0}")]
    Timeout(TimeoutPhase),

    /// Upstream answered with a non-success status
    #[error("Request failed with HTTP {status}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
    },

    /// Payload received but not parseable in any supported format
    #[error("Decode error: {0}")]
    DecodeError(String),
}

/// Where in the request a timeout fired
///
/// The transport cannot tell the read and overall limits apart, so both
/// are reported as [`TimeoutPhase::Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// No connection within the connect limit
    Connect,
    /// Connected, but no complete response within the read or overall limit
    Response,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => f.write_str("while connecting"),
            Self::Response => f.write_str("waiting for response"),
        }
    }
}

/// Coarse classification used by the propagation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Programming or input error, raised before any network call
    InvalidConfig,
    /// Transport failure, timeout, or non-success status
    Network,
    /// Payload could not be decoded
    Decode,
}

impl MyStopError {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::ConnectionFailed(_) | Self::Timeout(_) | Self::HttpStatus { .. } => {
                ErrorKind::Network
            },
            Self::DecodeError(_) => ErrorKind::Decode,
        }
    }

    /// Returns true if this error is retryable
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network)
    }

    /// Returns true for configuration errors that must always reach the caller
    #[must_use]
    pub const fn is_invalid_config(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(MyStopError::ConnectionFailed("reset".to_string()).is_retryable());
        assert!(MyStopError::Timeout(TimeoutPhase::Connect).is_retryable());
        assert!(MyStopError::Timeout(TimeoutPhase::Response).is_retryable());
        assert!(MyStopError::HttpStatus { status: 503 }.is_retryable());
        assert!(MyStopError::HttpStatus { status: 404 }.is_retryable());
    }

    #[test]
    fn test_non_retryable_errors() {
        assert!(!MyStopError::InvalidConfig("base_url".to_string()).is_retryable());
        assert!(!MyStopError::DecodeError("not json".to_string()).is_retryable());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            MyStopError::InvalidConfig(String::new()).kind(),
            ErrorKind::InvalidConfig
        );
        assert_eq!(
            MyStopError::Timeout(TimeoutPhase::Response).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            MyStopError::DecodeError(String::new()).kind(),
            ErrorKind::Decode
        );
    }

    #[test]
    fn test_error_display() {
        let err = MyStopError::HttpStatus { status: 502 };
        assert!(err.to_string().contains("502"));

        let err = MyStopError::Timeout(TimeoutPhase::Connect);
        assert_eq!(err.to_string(), "Request timed out while connecting");
        let err = MyStopError::Timeout(TimeoutPhase::Response);
        assert_eq!(err.to_string(), "Request timed out waiting for response");

        let err = MyStopError::InvalidConfig("stop_id must be a numeric id".to_string());
        assert!(err.to_string().contains("stop_id"));
    }
}
