//! Error types for resource request dispatch

use oauth_token::AuthError;

/// Errors from dispatching an authenticated resource request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Token acquisition or refresh failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The transport could not complete the request
    #[error("resource request failed: {0}")]
    Http(String),

    /// The resource server rejected the bearer token twice in a row,
    /// once before and once after a refresh
    #[error("resource server rejected the bearer token: {body}")]
    Unauthorized { body: String },
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;
