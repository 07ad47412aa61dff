// Error handling module
// Defines the error taxonomy surfaced by the storefront client

use thiserror::Error;

/// Errors surfaced by the storefront API client.
///
/// `Unauthenticated` and `RefreshFailed` are the only variants that imply a
/// forced logout; everything else leaves the session untouched.
#[derive(Error, Debug)]
pub enum ApiError {
    /// No valid access or refresh token is available; the caller must log in again
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// The identity server rejected the refresh token
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Timeout or connectivity failure
    #[error("network error: {0}")]
    Network(String),

    /// Non-401 client error from the backend
    #[error("validation error: {status} - {message}")]
    Validation { status: u16, message: String },

    /// Server-side error from the backend
    #[error("server error: {status} - {message}")]
    Server { status: u16, message: String },

    /// Internal client error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Classify a non-success HTTP status into the error taxonomy.
    ///
    /// 401 is never passed here; the client resolves it via refresh before
    /// the typed surface classifies the response.
    pub fn from_status(status: u16, message: String) -> Self {
        if status >= 500 {
            ApiError::Server { status, message }
        } else {
            ApiError::Validation { status, message }
        }
    }

    /// Classify a reqwest transport error.
    ///
    /// Timeouts and connection failures are reported as `Network` and must
    /// never trigger a token refresh.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connection_failed"
        } else if err.is_request() {
            "request_error"
        } else if err.is_body() {
            "body_error"
        } else if err.is_decode() {
            "decode_error"
        } else {
            "unknown"
        };

        match kind {
            "timeout" | "connection_failed" | "request_error" => {
                ApiError::Network(format!("{} ({})", err, kind))
            }
            _ => ApiError::Internal(anyhow::anyhow!("HTTP transport failed: {} ({})", err, kind)),
        }
    }

    /// True for the variants that force a logout
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthenticated(_) | ApiError::RefreshFailed(_)
        )
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;
