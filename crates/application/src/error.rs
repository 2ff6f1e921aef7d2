//! Application-level errors

use integration_mystop::MyStopError;
use thiserror::Error;

/// Errors that can occur in the application layer
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Upstream client error
    #[error(transparent)]
    Client(#[from] MyStopError),

    /// A stop monitor with this unique id already exists
    #[error("Already configured: {0}")]
    AlreadyConfigured(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ApplicationError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Client(err) if err.is_retryable())
    }
}
