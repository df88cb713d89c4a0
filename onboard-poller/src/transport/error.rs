//! Transport error types.

/// Errors from a request against an on-board portal.
///
/// Malformed payloads share this type with network failures: to the polling
/// engine both mean "this cycle produced no usable data".
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// HTTP request failed (network error, timeout, reset)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Portal returned an error status code
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Portal requires a login or rejected the request
    #[error("unauthorized (is the portal login required?)")]
    Unauthorized,

    /// Rate limited by the portal
    #[error("rate limited by the portal")]
    RateLimited,

    /// The portal software supports this feature, but not on this vehicle
    #[error("feature not supported by this portal: {path}")]
    FeatureMissing { path: String },

    /// The portal answered, but the payload could not be interpreted
    #[error("malformed response: {message}")]
    Malformed {
        message: String,
        body: Option<String>,
    },

    /// The transport could not be built from its configuration
    #[error("invalid transport configuration: {0}")]
    Config(String),
}

impl ConnectionError {
    /// Shorthand for a [`ConnectionError::Malformed`] without a body excerpt.
    pub fn malformed(message: impl Into<String>) -> Self {
        ConnectionError::Malformed {
            message: message.into(),
            body: None,
        }
    }

    /// Whether the portal answered with something unusable.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ConnectionError::Malformed { .. })
    }

    /// Whether repeating the same request right away may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectionError::Http(e) => !e.is_decode() && !e.is_builder(),
            ConnectionError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
