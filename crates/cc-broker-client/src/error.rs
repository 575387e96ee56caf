//! Broker client error types.

/// Errors from broker calls.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// HTTP transport error.
    #[error("HTTP error calling {endpoint}: {source}")]
    Http {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The broker did not answer within the client timeout.
    #[error("broker at {endpoint} timed out after {timeout_secs}s")]
    Timeout { endpoint: String, timeout_secs: u64 },
    /// The broker returned an unexpected status.
    #[error("broker {endpoint} returned {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// Response deserialization failed.
    #[error("failed to deserialize response from {endpoint}: {source}")]
    Deserialization {
        endpoint: String,
        source: reqwest::Error,
    },
    /// The instance or client configuration cannot be used.
    #[error("configuration error: {0}")]
    Config(String),
    /// The broker refused the operation.
    #[error("broker rejected request: {0}")]
    Rejected(String),
}

impl BrokerError {
    /// Whether the call may succeed if repeated.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Timeout { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Deserialization { .. } | Self::Config(_) | Self::Rejected(_) => false,
        }
    }
}
