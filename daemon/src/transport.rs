//! Outbound HTTP delivery of webhook payloads.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, ClientBuilder};
use std::future::Future;
use std::time::Duration;

use crate::config::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS};

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Total time allowed for one request, including the connect.
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: format!("sys-webhook/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(e)
        }
    }
}

/// Sends one JSON body to a URL. `Ok` means the endpoint received it.
pub trait Transport {
    fn post_json(&self, url: &str, body: String) -> impl Future<Output = Result<(), TransportError>>;
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    inner: Client,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, TransportError> {
        let inner = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(TransportError::ClientBuild)?;
        Ok(Self { inner })
    }
}

impl Transport for HttpTransport {
    /// Any HTTP response counts as delivered; only a failure to complete the
    /// exchange (connect error, reset, timeout) is an error. Non-success
    /// statuses are logged so a misconfigured endpoint is visible.
    async fn post_json(&self, url: &str, body: String) -> Result<(), TransportError> {
        tracing::debug!(url, bytes = body.len(), "POST webhook");
        let response = self
            .inner
            .post(url)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(%status, url, "Webhook accepted");
        } else {
            tracing::warn!(%status, url, "Webhook endpoint answered with a non-success status");
        }
        Ok(())
    }
}
