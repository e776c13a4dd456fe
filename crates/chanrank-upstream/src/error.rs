use thiserror::Error;

/// Errors returned by the upstream API client.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP 403 carrying a quota reason. The key has already been marked
    /// exhausted; the next call rotates to another key.
    #[error("quota exceeded for key {key}: {message}")]
    QuotaExceeded { key: String, message: String },

    /// Every key in the pool is exhausted for the rest of the run.
    #[error("all upstream API keys are exhausted")]
    AllKeysExhausted,

    /// Any other non-2xx response. Not retried.
    #[error("upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Network, TLS, or timeout failure from the underlying HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid upstream base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

impl UpstreamError {
    /// `true` when no further calls can succeed during this run.
    #[must_use]
    pub fn ends_run(&self) -> bool {
        matches!(self, UpstreamError::AllKeysExhausted)
    }
}
