//! Backend error types.

use thiserror::Error;

/// Errors that can occur during a single backend completion call.
///
/// Every variant triggers fallback advancement in the executor; none of
/// them propagates past the routing layer as a panic or an unhandled
/// error.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend has no credentials configured and can never be called.
    #[error("Backend not configured: {0}")]
    NotConfigured(String),

    /// HTTP request failed (network, DNS, TLS).
    #[error("Backend request failed: {0}")]
    RequestFailed(String),

    /// The provider returned a non-success HTTP status.
    #[error("Backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (truncated by the provider impl).
        body: String,
    },

    /// Request timed out.
    #[error("Backend request timed out after {0}ms")]
    Timeout(u64),

    /// Response body could not be parsed into the expected shape.
    #[error("Failed to parse backend response: {0}")]
    ParseError(String),

    /// The provider answered successfully but generated no text.
    ///
    /// Treated identically to a call failure: an empty completion must
    /// never be cached or returned to the user.
    #[error("Backend returned an empty completion")]
    EmptyCompletion,
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(0)
        } else if err.is_connect() {
            BackendError::RequestFailed(format!("connect: {err}"))
        } else {
            BackendError::RequestFailed(err.to_string())
        }
    }
}
