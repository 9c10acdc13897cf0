//! Outbound HTTP with a per-attempt deadline and bounded retries.

use super::request::OutboundRequest;
use super::retry::{LogObserver, RetryObserver, RetryPolicy, retry_with_backoff};
use crate::defaults;
use crate::error::{RelayError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Sends [`OutboundRequest`]s, retrying transient failures.
///
/// Each attempt is bounded by `attempt_timeout`, which covers connecting,
/// sending and receiving the response head (plus the error body of a
/// non-2xx response). A successful response body is not bounded; it belongs
/// to the caller once returned.
///
/// Dropping the future returned by [`Fetcher::fetch_with_retry`] aborts the
/// attempt in flight and any pending backoff sleep.
#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    attempt_timeout: Duration,
    observer: Arc<dyn RetryObserver>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Create a fetcher with its own connection pool.
    pub fn new(attempt_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(attempt_timeout)
            .user_agent(concat!("tokenrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, attempt_timeout))
    }

    /// Create a fetcher around an existing client.
    pub fn with_client(client: reqwest::Client, attempt_timeout: Duration) -> Self {
        Self {
            client,
            attempt_timeout,
            observer: Arc::new(LogObserver),
        }
    }

    /// Replace the retry observer (defaults to [`LogObserver`]).
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Send `request` until a 2xx response arrives or `policy` is exhausted.
    ///
    /// Returns the successful response with its body unread. On exhaustion
    /// the last attempt's error is returned: [`RelayError::Upstream`] for a
    /// non-2xx response, [`RelayError::Timeout`] for an expired deadline,
    /// [`RelayError::Transport`] for a network failure.
    pub async fn fetch_with_retry(
        &self,
        request: &OutboundRequest,
        policy: &RetryPolicy,
    ) -> Result<reqwest::Response> {
        retry_with_backoff(policy, self.observer.as_ref(), |attempt| {
            self.attempt(request, attempt)
        })
        .await
    }

    async fn attempt(&self, request: &OutboundRequest, attempt: u32) -> Result<reqwest::Response> {
        let builder = request.to_builder(&self.client)?;
        tracing::debug!(attempt, url = %redact_query(request.url()), "Sending upstream request");

        let outcome = tokio::time::timeout(self.attempt_timeout, async {
            let response = builder.send().await.map_err(transport_error)?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    let e = e.without_url();
                    tracing::debug!(error = %e, "Failed to read upstream error body");
                    format!("(error body unreadable: {e})")
                }
            };
            Err(RelayError::Upstream {
                status: status.as_u16(),
                body,
            })
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(RelayError::Timeout {
                timeout: self.attempt_timeout,
            }),
        }
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::with_client(
            reqwest::Client::new(),
            Duration::from_secs(defaults::ATTEMPT_TIMEOUT_SECS),
        )
    }
}

fn transport_error(error: reqwest::Error) -> RelayError {
    RelayError::Transport {
        message: error.without_url().to_string(),
    }
}

/// Strip the query string so logged URLs carry no parameters.
fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(path, _)| path)
}
