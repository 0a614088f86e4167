//! Token lifecycle orchestration
//!
//! `TokenHandler` owns the only live `Token` and drives it through its
//! states: Absent until an authorization code is exchanged (or a stored
//! token is restored), Valid while inside the expiry boundary, Expired
//! once the clock passes it, back to Valid on a successful refresh.
//!
//! The token sits behind a `tokio::sync::Mutex` and the lock is held
//! across the endpoint round trip of a refresh, so concurrent callers
//! that observe an expired token await one in-flight refresh and share
//! its result instead of each spending a provider exchange.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::endpoint::{Credentials, EndpointAuth, TokenEndpoint};
use crate::error::AuthError;
use crate::store::TokenStore;
use crate::token::{Token, unix_now};

/// Seconds subtracted from the clock when judging expiry, absent an
/// explicit configuration.
pub const DEFAULT_EXPIRY_BUFFER_SECS: u64 = 10;

/// Construction parameters for a `TokenHandler`.
///
/// `new` fills the customary defaults (body credentials, encryption on,
/// derived file name, 10 s expiry buffer); the fields are public for the
/// cases that differ. The storage directory is always explicit; the
/// handler never falls back to the process working directory.
pub struct HandlerConfig {
    /// Absolute URL of the provider's token endpoint
    pub token_url: String,
    /// How the client authenticates to the token endpoint
    pub auth: EndpointAuth,
    pub credentials: Credentials,
    /// Encrypt the persisted token under the client credentials
    pub encrypt: bool,
    /// Directory holding the token file
    pub token_dir: std::path::PathBuf,
    /// File name override; derived from the endpoint host and client id
    /// when `None`
    pub token_file: Option<String>,
    pub expiry_buffer_secs: u64,
}

impl HandlerConfig {
    pub fn new(
        token_url: impl Into<String>,
        credentials: Credentials,
        token_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            auth: EndpointAuth::Body,
            credentials,
            encrypt: true,
            token_dir: token_dir.into(),
            token_file: None,
            expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
        }
    }
}

/// Default token file name for a (host, client id) pair.
///
/// `.oauth_token_` plus the URL-safe base64 of `SHA-256(host + client_id)`,
/// so distinct providers and clients never collide in a shared directory
/// and the same pair always maps to the same file.
pub fn default_token_file(host: &str, client_id: &str) -> String {
    let digest = Sha256::digest(format!("{host}{client_id}").as_bytes());
    format!(".oauth_token_{}", URL_SAFE_NO_PAD.encode(digest))
}

/// Where the live token currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// No token: nothing restored and no exchange yet
    Absent,
    /// Token inside its expiry boundary
    Valid,
    /// Token past its expiry boundary; next use will refresh
    Expired,
}

impl TokenState {
    /// Status label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            TokenState::Absent => "absent",
            TokenState::Valid => "valid",
            TokenState::Expired => "expired",
        }
    }
}

/// Owner and orchestrator of the live token.
pub struct TokenHandler {
    endpoint: TokenEndpoint,
    credentials: Credentials,
    store: TokenStore,
    expiry_buffer: u64,
    token: Mutex<Option<Token>>,
    http: reqwest::Client,
}

impl TokenHandler {
    /// Build a handler and try to restore a persisted token.
    ///
    /// A failed restore (missing file, bad ciphertext, bad record) is not
    /// an error: the handler starts without a token and the application
    /// exchanges an authorization code when it has one. Configuration
    /// problems (unparseable endpoint URL, credentials too short to key
    /// the cipher) do fail construction.
    pub async fn connect(config: HandlerConfig, http: reqwest::Client) -> common::Result<Self> {
        let url = reqwest::Url::parse(&config.token_url).map_err(|e| {
            common::Error::Config(format!(
                "invalid token endpoint URL {}: {e}",
                config.token_url
            ))
        })?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(common::Error::Config(format!(
                "token endpoint URL must be http(s), got {}",
                config.token_url
            )));
        }
        let host = url.host_str().ok_or_else(|| {
            common::Error::Config(format!(
                "token endpoint URL has no host: {}",
                config.token_url
            ))
        })?;

        let file = config
            .token_file
            .unwrap_or_else(|| default_token_file(host, &config.credentials.client_id));
        let path = config.token_dir.join(file);
        let store = if config.encrypt {
            TokenStore::encrypted(
                path,
                &config.credentials.client_id,
                config.credentials.client_secret.expose(),
            )?
        } else {
            TokenStore::plaintext(path)
        };

        let token = match store.load().await {
            Ok(token) => {
                info!(path = %store.path().display(), "restored persisted token");
                Some(token)
            }
            Err(e) => {
                debug!(path = %store.path().display(), error = %e, "no usable persisted token, starting without one");
                None
            }
        };

        Ok(Self {
            endpoint: TokenEndpoint::new(config.token_url, config.auth),
            credentials: config.credentials,
            store,
            expiry_buffer: config.expiry_buffer_secs,
            token: Mutex::new(token),
            http,
        })
    }

    /// Path of the persisted token file.
    pub fn token_path(&self) -> &Path {
        self.store.path()
    }

    /// Current lifecycle state, judged against the configured buffer.
    pub async fn state(&self) -> TokenState {
        match self.token.lock().await.as_ref() {
            None => TokenState::Absent,
            Some(token) if token.expired(self.expiry_buffer) => TokenState::Expired,
            Some(_) => TokenState::Valid,
        }
    }

    /// The current access token, if any, without an expiry check.
    pub async fn access_token(&self) -> Option<String> {
        self.token
            .lock()
            .await
            .as_ref()
            .map(|token| token.access_token.clone())
    }

    /// Exchange an authorization code for a fresh token and persist it.
    ///
    /// On endpoint failure no token is installed. On a save failure the
    /// fresh token stays live (it is valid) and the error is surfaced, so
    /// the caller knows a restart would force re-authorization.
    pub async fn exchange(
        &self,
        code: &str,
        callback_url: &str,
        scope: &str,
    ) -> Result<(), AuthError> {
        let response = self
            .endpoint
            .exchange(&self.http, &self.credentials, code, callback_url, scope)
            .await?;
        let fresh = Token::from_response(response, unix_now());

        let mut guard = self.token.lock().await;
        let token = guard.insert(fresh);
        self.store.save(token).await?;
        info!(path = %self.store.path().display(), "authorization code exchanged, token persisted");
        Ok(())
    }

    /// Refresh the live token through the token endpoint and persist it.
    ///
    /// On failure the existing token is left exactly as it was and the
    /// error is surfaced; there is no internal retry and no reload of
    /// possibly-staler disk state.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let mut guard = self.token.lock().await;
        let token = guard.as_mut().ok_or(AuthError::NoToken)?;
        self.refresh_locked(token).await
    }

    /// A valid access token, refreshing first if the live one is past its
    /// expiry boundary. Fails with `NoToken` when there is nothing to
    /// refresh from, or with the refresh failure itself when renewal is
    /// impossible; that outcome is the caller's to handle, never
    /// swallowed here.
    pub async fn ensure_valid(&self) -> Result<String, AuthError> {
        let mut guard = self.token.lock().await;
        let token = guard.as_mut().ok_or(AuthError::NoToken)?;
        if token.expired(self.expiry_buffer) {
            debug!("access token past expiry boundary, refreshing");
            self.refresh_locked(token).await?;
        }
        Ok(token.access_token.clone())
    }

    /// Refresh with the token lock already held. The in-place `update`
    /// only happens after a fully parsed endpoint response, so a failure
    /// at any point leaves the token untouched.
    async fn refresh_locked(&self, token: &mut Token) -> Result<(), AuthError> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;
        let response = self
            .endpoint
            .refresh(&self.http, &self.credentials, &refresh_token)
            .await?;

        // Providers routinely omit the refresh token from refresh
        // responses; keep the one we just used so the next cycle works.
        let next_refresh = response.refresh_token.or(Some(refresh_token));
        token.update(
            response.access_token,
            response.expires_in,
            next_refresh,
            unix_now(),
        );
        self.store.save(token).await?;
        info!("access token refreshed");
        Ok(())
    }
}
