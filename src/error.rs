//! Error types for playlist-insights.

use thiserror::Error;

/// Failure taxonomy for the auth flow, catalog client and analysis pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Callback `state` did not match the nonce stored when the flow started.
    #[error("authorization state mismatch")]
    StateMismatch,

    /// No pending code verifier exists for this session.
    #[error("no pending authorization verifier")]
    MissingVerifier,

    /// Token endpoint rejected the code exchange.
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    /// 401 from the catalog API, or no usable token at request time.
    #[error("authentication expired")]
    AuthExpired,

    /// 403: the account cannot see this resource.
    #[error("access denied")]
    AccessDenied,

    /// 404.
    #[error("resource not found")]
    NotFound,

    /// Still rate limited after the single automatic retry.
    #[error("rate limited (retry-after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// 5xx from the catalog API.
    #[error("remote server error (status {status})")]
    RemoteServerError { status: u16 },

    /// Any other 4xx, with the remote-supplied message when present.
    #[error("remote request failed (status {status}): {message}")]
    RemoteRequestError { status: u16, message: String },

    /// No response received: connect failure, timeout, or body read error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// A 2xx response whose body did not decode as expected.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Analysis is undefined without at least one feature record.
    #[error("not enough data to analyze")]
    InsufficientData,

    /// Malformed playlist reference.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller abandoned the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Credential/session persistence failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::NetworkError(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Storage(format!("blocking task failed: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
