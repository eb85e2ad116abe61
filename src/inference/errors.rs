//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to build
//! meaningful log entries.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a provider's completion API.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the provider endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The provider did not respond within the request timeout.
    #[error("request to {endpoint} timed out after {duration_secs}s")]
    Timeout { endpoint: String, duration_secs: u64 },

    /// Non-2xx HTTP response from the provider.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("failed to parse provider response: {reason}")]
    ParseError { reason: String },

    /// The model identifier names a provider without a known endpoint.
    #[error("no completion endpoint known for provider '{provider}'")]
    UnsupportedProvider { provider: String },

    /// The model identifier is not of the form `provider/model`.
    #[error("model identifier '{model}' has no provider prefix")]
    MissingProvider { model: String },
}

impl InferenceError {
    /// Map a `reqwest` send/read failure onto the taxonomy.
    pub fn from_request(endpoint: &str, timeout: Duration, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            InferenceError::Timeout {
                endpoint: endpoint.to_string(),
                duration_secs: timeout.as_secs(),
            }
        } else {
            InferenceError::ConnectionFailed {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_names_endpoint() {
        let err = InferenceError::Timeout {
            endpoint: "https://example.test/v1".into(),
            duration_secs: 60,
        };
        assert_eq!(
            err.to_string(),
            "request to https://example.test/v1 timed out after 60s"
        );
    }
}
