//! Directory and store error types
//!
//! Error definitions with retryable/terminal classification for retry logic.

use thiserror::Error;

/// Result type for directory fetches.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure while reading a whole directory.
///
/// A fetch either returns every record or fails; adapters never hand back
/// a partial listing.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network or HTTP failure talking to the directory.
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials were rejected or a token could not be acquired.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The directory answered with something that could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The fetch did not finish within its time budget.
    #[error("fetch timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The directory kept throttling requests.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The local store could not be listed.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),
}

impl FetchError {
    /// Check if repeating the whole fetch may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout { .. } | FetchError::RateLimited(_) => {
                true
            }
            FetchError::Store(e) => e.is_retryable(),
            FetchError::Auth(_) | FetchError::MalformedResponse(_) => false,
        }
    }

    /// Get an error code for classification.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "TRANSPORT",
            FetchError::Auth(_) => "AUTH",
            FetchError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            FetchError::Timeout { .. } => "TIMEOUT",
            FetchError::RateLimited(_) => "RATE_LIMITED",
            FetchError::Store(_) => "STORE",
        }
    }
}

/// Failure reading or writing the local user store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Temporary persistence hiccup; the operation may be repeated.
    #[error("transient store error: {0}")]
    Transient(String),

    /// An account with the same name or email already exists.
    #[error("account already exists: {identity_key}")]
    AlreadyExists { identity_key: String },

    /// The account data is invalid and will never be accepted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A write targeted a field the local schema does not define.
    #[error("unknown local field: {0}")]
    UnknownField(String),

    /// Permanent backend failure.
    #[error("store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this error is transient and the operation can be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    /// Check if this error is a validation failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, StoreError::Validation(_))
    }
}
