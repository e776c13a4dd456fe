//! Rate-limited fetcher for the upstream data API.
//!
//! Every call draws a key from the shared [`KeyPool`], waits out the
//! caller's minimum inter-call interval, and charges the endpoint's unit cost
//! to the key whatever the outcome. Quota rejections exhaust the key; nothing
//! is retried here.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::UpstreamError;
use crate::key_pool::{ApiKey, KeyPool};
use crate::types::ErrorEnvelope;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3/";

/// Error reasons the upstream attaches to a 403 when a key's quota is spent.
const QUOTA_REASONS: &[&str] = &["quotaExceeded", "dailyLimitExceeded"];

/// Upstream resources the fetcher knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Search,
    Channels,
}

impl Endpoint {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Search => "search",
            Endpoint::Channels => "channels",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub timeout_secs: u64,
    /// Minimum spacing between consecutive calls from one logical caller.
    pub min_interval: Duration,
    pub user_agent: String,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            min_interval: Duration::from_millis(300),
            user_agent: "chanrank/0.1 (channel-rankings)".to_owned(),
        }
    }
}

/// Client for the upstream REST API.
///
/// Use [`Fetcher::new`] for production or [`Fetcher::with_base_url`] to point
/// at a mock server in tests. Each logical caller should take its own handle
/// via [`Fetcher::for_caller`] so pacing is tracked per caller while the key
/// pool stays shared.
#[derive(Debug)]
pub struct Fetcher {
    client: Client,
    base_url: Url,
    pool: Arc<KeyPool>,
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Fetcher {
    /// Creates a fetcher pointed at the production API.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Transport`] if the `reqwest::Client` cannot be
    /// constructed.
    pub fn new(pool: Arc<KeyPool>, options: &FetcherOptions) -> Result<Self, UpstreamError> {
        Self::with_base_url(pool, options, DEFAULT_BASE_URL)
    }

    /// Creates a fetcher with a custom base URL.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Transport`] if the `reqwest::Client` cannot be
    /// constructed, or [`UpstreamError::InvalidBaseUrl`] if `base_url` does
    /// not parse.
    pub fn with_base_url(
        pool: Arc<KeyPool>,
        options: &FetcherOptions,
        base_url: &str,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(options.user_agent.clone())
            .build()?;

        // Exactly one trailing slash so `join` appends the endpoint path
        // instead of replacing the last segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| UpstreamError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url,
            pool,
            min_interval: options.min_interval,
            last_call: Mutex::new(None),
        })
    }

    /// A handle sharing this fetcher's HTTP client and key pool, with its own
    /// pacing clock.
    #[must_use]
    pub fn for_caller(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            pool: Arc::clone(&self.pool),
            min_interval: self.min_interval,
            last_call: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<KeyPool> {
        &self.pool
    }

    /// Performs one chargeable GET against `endpoint` and decodes the body.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::AllKeysExhausted`] when no key is usable; nothing is
    ///   sent and nothing is charged.
    /// - [`UpstreamError::QuotaExceeded`] on a 403 quota rejection. The key is
    ///   marked exhausted before returning.
    /// - [`UpstreamError::Upstream`] for any other non-2xx status.
    /// - [`UpstreamError::Transport`] on network failure or timeout.
    /// - [`UpstreamError::Deserialize`] if a 2xx body does not match `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        params: &[(&str, &str)],
        cost: u64,
    ) -> Result<T, UpstreamError> {
        self.pace().await;
        let key = self.pool.next()?;

        let url = self.build_url(endpoint, key.secret(), params);
        let outcome = self.send(url).await;
        self.pool.record_usage(&key, cost);
        let (status, body) = outcome?;

        if !status.is_success() {
            return Err(self.classify_failure(&key, status, &body));
        }

        tracing::debug!(
            endpoint = endpoint.path(),
            key = %key.masked(),
            cost,
            "upstream call succeeded"
        );
        serde_json::from_str(&body).map_err(|e| UpstreamError::Deserialize {
            context: endpoint.path().to_owned(),
            source: e,
        })
    }

    /// Builds the request URL with percent-encoded query parameters. The key
    /// is appended last.
    fn build_url(&self, endpoint: Endpoint, key: &str, params: &[(&str, &str)]) -> Url {
        let mut url = self
            .base_url
            .join(endpoint.path())
            .unwrap_or_else(|_| self.base_url.clone());
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
            pairs.append_pair("key", key);
        }
        url
    }

    async fn send(&self, url: Url) -> Result<(StatusCode, String), UpstreamError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// Sleeps until `min_interval` has passed since this caller's previous call.
    async fn pace(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn classify_failure(&self, key: &ApiKey, status: StatusCode, body: &str) -> UpstreamError {
        let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
        let message = envelope
            .as_ref()
            .map(|e| e.error.message.trim().to_owned())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_owned());

        if status == StatusCode::FORBIDDEN && envelope.is_some_and(|e| is_quota_rejection(&e)) {
            self.pool.mark_exhausted(key);
            return UpstreamError::QuotaExceeded {
                key: key.masked(),
                message,
            };
        }

        tracing::warn!(
            status = status.as_u16(),
            key = %key.masked(),
            message = %message,
            "upstream call failed"
        );
        UpstreamError::Upstream {
            status: status.as_u16(),
            message,
        }
    }
}

fn is_quota_rejection(envelope: &ErrorEnvelope) -> bool {
    envelope
        .error
        .errors
        .iter()
        .any(|d| QUOTA_REASONS.contains(&d.reason.as_str()))
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
