//! Error types for token lifecycle operations

/// Errors from token endpoint interactions and lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("token endpoint request failed: {0}")]
    Http(String),

    #[error("token endpoint returned {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    #[error("no token available, authorization code exchange required")]
    NoToken,

    #[error("current token has no refresh token")]
    NoRefreshToken,

    #[error("failed to persist token: {0}")]
    Save(#[from] SaveError),
}

/// Errors from restoring a token from its file.
///
/// Always recoverable at the call site: a handler that cannot load simply
/// starts without a token.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("reading token file: {0}")]
    Io(#[from] std::io::Error),

    #[error("token file ciphertext is malformed")]
    Decrypt,

    #[error("parsing token record: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors from writing a token to its file.
///
/// Surfaced to the caller: a missed save risks forcing an unnecessary
/// re-authorization after the next restart.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("writing token file: {0}")]
    Io(#[from] std::io::Error),

    #[error("serializing token record: {0}")]
    Serialize(#[from] serde_json::Error),
}
