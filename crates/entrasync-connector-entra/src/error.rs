//! Error types for the Entra ID connector.

use entrasync_connector::error::FetchError;
use thiserror::Error;

/// Result type alias using `EntraError`.
pub type EntraResult<T> = Result<T, EntraError>;

/// Errors that can occur when reading from Entra ID.
#[derive(Debug, Error)]
pub enum EntraError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// `OAuth2` authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The token endpoint throttled the request or failed on its side.
    #[error("Token endpoint unavailable ({status}): {message}")]
    TokenUnavailable { status: u16, message: String },

    /// Microsoft Graph API error.
    #[error("Graph API error: {code} - {message}")]
    GraphApi {
        status: u16,
        code: String,
        message: String,
    },

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// A user object was missing a required property.
    #[error("Malformed user object: {0}")]
    MalformedUser(String),

    /// Circuit breaker is open, requests are being rejected.
    #[error("Circuit breaker open, failing fast")]
    CircuitOpen,

    /// Maximum retry attempts exceeded.
    #[error("Maximum retries ({attempts}) exceeded")]
    MaxRetriesExceeded { attempts: u32 },
}

impl EntraError {
    /// Whether repeating the fetch later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            EntraError::Http(e) => !e.is_decode(),
            EntraError::GraphApi { status, .. } => *status == 429 || *status >= 500,
            EntraError::TokenUnavailable { .. }
            | EntraError::CircuitOpen
            | EntraError::MaxRetriesExceeded { .. } => true,
            EntraError::Config(_)
            | EntraError::Auth(_)
            | EntraError::Json(_)
            | EntraError::Url(_)
            | EntraError::MalformedUser(_) => false,
        }
    }
}

impl From<EntraError> for FetchError {
    fn from(e: EntraError) -> Self {
        match e {
            EntraError::Auth(msg) => FetchError::Auth(msg),
            EntraError::GraphApi { status, .. } if status == 401 || status == 403 => {
                FetchError::Auth(e.to_string())
            }
            EntraError::Http(ref inner) if inner.is_decode() => {
                FetchError::MalformedResponse(e.to_string())
            }
            EntraError::Json(_) | EntraError::MalformedUser(_) => {
                FetchError::MalformedResponse(e.to_string())
            }
            EntraError::CircuitOpen | EntraError::MaxRetriesExceeded { .. } => {
                FetchError::RateLimited(e.to_string())
            }
            EntraError::Config(_)
            | EntraError::Url(_)
            | EntraError::Http(_)
            | EntraError::TokenUnavailable { .. }
            | EntraError::GraphApi { .. } => FetchError::Transport(e.to_string()),
        }
    }
}
