use thiserror::Error;

/// Result alias for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Error taxonomy for API calls.
///
/// Authorization failures are the only class the client resolves locally
/// (via token refresh); every other class is surfaced unchanged to the
/// caller, which decides user-facing behavior.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received (DNS failure, timeout, offline).
    #[error("network error: {0}")]
    Network(String),

    /// Credentials could not be renewed: the refresh call failed or no
    /// refresh token was available. The credential store has been cleared.
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    /// 5xx responses.
    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },

    /// Any other status; carries the raw response body for diagnostics.
    #[error("unexpected status {status}: {body}")]
    Unexpected { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}
