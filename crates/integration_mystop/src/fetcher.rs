//! HTTP fetching with timeout and retry
//!
//! [`HttpTransport`] is the seam to the host's connection pool;
//! [`ReqwestTransport`] adapts a `reqwest::Client`. [`HttpFetcher`] layers
//! the retry policy and JSON decoding on top of any transport.

use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::TimeoutPolicy;
use crate::error::{MyStopError, TimeoutPhase};
use crate::retry::{RetryPolicy, retry};

/// A single GET request, without retries
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Fetch `url` and return the response body
    ///
    /// Non-success statuses must be reported as [`MyStopError::HttpStatus`].
    async fn get_text(&self, url: &str) -> Result<String, MyStopError>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: TimeoutPolicy,
}

impl ReqwestTransport {
    /// Build a dedicated client with the full composite timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(timeout: &TimeoutPolicy, user_agent: &str) -> Result<Self, MyStopError> {
        let client = Client::builder()
            .timeout(timeout.total())
            .connect_timeout(timeout.connect())
            .read_timeout(timeout.read())
            .user_agent(user_agent)
            .build()
            .map_err(|e| MyStopError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            timeout: timeout.clone(),
        })
    }

    /// Reuse a host-owned client
    ///
    /// Connect and read timeouts are whatever the host configured on its
    /// client; the overall timeout is applied per request.
    #[must_use]
    pub const fn with_client(client: Client, timeout: TimeoutPolicy) -> Self {
        Self { client, timeout }
    }

}

fn map_reqwest_error(err: &reqwest::Error) -> MyStopError {
    if err.is_timeout() {
        let phase = if err.is_connect() {
            TimeoutPhase::Connect
        } else {
            TimeoutPhase::Response
        };
        MyStopError::Timeout(phase)
    } else {
        MyStopError::ConnectionFailed(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get_text(&self, url: &str) -> Result<String, MyStopError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout.total())
            .send()
            .await
            .map_err(|e| map_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MyStopError::HttpStatus {
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| map_reqwest_error(&e))
    }
}

/// Transport plus retry policy
#[derive(Clone)]
pub struct HttpFetcher {
    transport: Arc<dyn HttpTransport>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("transport", &"dyn HttpTransport")
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpFetcher {
    /// Create a fetcher over `transport`
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// GET `url` as text, retrying transport failures
    #[instrument(skip(self))]
    pub async fn fetch_text(&self, url: &str) -> Result<String, MyStopError> {
        let body = retry(&self.retry, || self.transport.get_text(url)).await?;
        debug!(bytes = body.len(), "Fetched response");
        Ok(body)
    }

    /// GET `url` and parse it as JSON
    ///
    /// A parse failure is a [`MyStopError::DecodeError`] and is not retried.
    pub async fn fetch_json(&self, url: &str) -> Result<Value, MyStopError> {
        let body = self.fetch_text(url).await?;
        serde_json::from_str(&body)
            .map_err(|e| MyStopError::DecodeError(format!("Response was not valid JSON: {e}")))
    }
}
