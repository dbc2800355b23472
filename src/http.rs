//! Retrying HTTP requests
//!
//! A thin layer over `reqwest` for poking at APIs under test. Requests that
//! fail at the connection level (refused, reset, timed out) are retried per
//! the client's [`RetryConfig`]; any response, whatever its status, is handed
//! back to the caller to assert on.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Method, Response};
use tracing::{debug, warn};

use crate::error::{ErrorKind, QaError, Result};
use crate::retry::{with_retry, CallbackHandler, NoopCallback, RetryConfig};

/// Attempts made by [`HttpClient::new`] unless overridden
pub const DEFAULT_HTTP_ATTEMPTS: u32 = 3;
pub const DEFAULT_HTTP_INTERVAL: Duration = Duration::from_secs(1);

/// HTTP client with retries on connection-level failures
///
/// # Examples
///
/// ```no_run
/// use qakit::http::HttpClient;
/// use std::time::Duration;
///
/// # async fn example() -> qakit::error::Result<()> {
/// let client = HttpClient::new(Duration::from_secs(10))?;
/// let response = client.get("http://localhost:8080/health").await?;
/// assert!(response.status().is_success());
/// # Ok(())
/// # }
/// ```
pub struct HttpClient {
    client: Client,
    retry_config: RetryConfig,
    callback: Arc<dyn CallbackHandler<Response>>,
}

impl HttpClient {
    /// Creates a client with the given per-request timeout and default retries
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("qakit/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            retry_config: RetryConfig::new([ErrorKind::Http], DEFAULT_HTTP_ATTEMPTS, DEFAULT_HTTP_INTERVAL)?,
            callback: Arc::new(NoopCallback),
        })
    }

    /// Sets a custom retry configuration for the HTTP client
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn CallbackHandler<Response>>) -> Self {
        self.callback = callback;
        self
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.send(Method::GET, url, None).await
    }

    pub async fn post(&self, url: &str, body: impl Into<String>) -> Result<Response> {
        self.send(Method::POST, url, Some(body.into())).await
    }

    pub async fn put(&self, url: &str, body: impl Into<String>) -> Result<Response> {
        self.send(Method::PUT, url, Some(body.into())).await
    }

    pub async fn delete(&self, url: &str) -> Result<Response> {
        self.send(Method::DELETE, url, None).await
    }

    async fn send(&self, method: Method, url: &str, body: Option<String>) -> Result<Response> {
        debug!("Sending {} {}", method, url);

        with_retry(
            || async {
                let mut request = self.client.request(method.clone(), url);
                if let Some(body) = &body {
                    request = request.body(body.clone());
                }

                request.send().await.map_err(|e| {
                    warn!("{} {} failed: {}", method, url, e);
                    classify(e)
                })
            },
            &self.retry_config,
            self.callback.as_ref(),
        )
        .await
    }
}

/// Maps a request failure onto the error kinds the retry policy sees
///
/// Only failures to reach the server or to complete the exchange in time are
/// `Http`. A request that could not be built (bad URL, bad header) fails the
/// same way every time and is a `Configuration` error.
fn classify(error: reqwest::Error) -> QaError {
    if error.is_builder() {
        return QaError::config(format!("invalid http request: {}", error));
    }
    if error.is_connect() || error.is_timeout() || error.is_request() {
        return QaError::Http(error);
    }
    QaError::Other(anyhow::Error::new(error))
}

/// One-shot helpers mirroring the client's verbs
///
/// Each call builds a client with a 30 second request timeout and retries
/// `retries` times, `interval` apart.
pub mod poke {
    use super::*;

    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    fn client(retries: u32, interval: Duration) -> Result<HttpClient> {
        Ok(HttpClient::new(REQUEST_TIMEOUT)?
            .with_retry_config(RetryConfig::new([ErrorKind::Http], retries, interval)?))
    }

    pub async fn get(url: &str, retries: u32, interval: Duration) -> Result<Response> {
        client(retries, interval)?.get(url).await
    }

    pub async fn post(url: &str, body: impl Into<String>, retries: u32, interval: Duration) -> Result<Response> {
        client(retries, interval)?.post(url, body).await
    }

    pub async fn put(url: &str, body: impl Into<String>, retries: u32, interval: Duration) -> Result<Response> {
        client(retries, interval)?.put(url, body).await
    }

    pub async fn delete(url: &str, retries: u32, interval: Duration) -> Result<Response> {
        client(retries, interval)?.delete(url).await
    }
}
