//! OAuth2 token lifecycle library
//!
//! Acquires, persists, expires, and refreshes access tokens for a consumer
//! calling a bearer-protected resource server. This crate is a standalone
//! library with no opinion about the resource requests themselves; the
//! `oauth-client` crate layers request dispatch on top of it.
//!
//! Credential flow:
//! 1. The application obtains an authorization code out of band (browser
//!    consent; this library cannot do that part)
//! 2. `TokenHandler::exchange()` trades the code for tokens and persists them
//! 3. `TokenHandler::ensure_valid()` returns a fresh access token before each
//!    resource call, refreshing through the token endpoint when the stored
//!    one has passed its expiry boundary
//! 4. Across process restarts, `TokenHandler::connect()` restores the token
//!    from its file via `TokenStore`

pub mod endpoint;
pub mod error;
pub mod handler;
pub mod store;
pub mod token;

pub use endpoint::{Credentials, EndpointAuth, TokenEndpoint, TokenResponse};
pub use error::{AuthError, LoadError, SaveError};
pub use handler::{
    DEFAULT_EXPIRY_BUFFER_SECS, HandlerConfig, TokenHandler, TokenState, default_token_file,
};
pub use store::TokenStore;
pub use token::Token;
