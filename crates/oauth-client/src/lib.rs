//! Bearer-authenticated resource client
//!
//! Wraps every outgoing resource request in the token lifecycle: a valid
//! access token is ensured before the request leaves (refreshing through
//! the token endpoint when the stored one has gone stale), the bearer
//! header is attached, and a 401 from the resource server triggers exactly
//! one refresh-and-resend before the failure is handed back to the
//! application. Any status other than 401 passes through untouched.

mod client;
mod error;

pub use client::{ClientConfig, OAuthClient};
pub use error::{Error, Result};

// The handler types appear in this crate's public API surface
pub use oauth_token::{AuthError, Credentials, EndpointAuth, TokenState};
