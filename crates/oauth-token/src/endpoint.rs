//! Token endpoint protocol
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (initial flow completion)
//! 2. Token refresh (proactive and request-time refresh)
//!
//! Both POST a form-encoded body with different grant types. Client
//! authentication is either in the form body (`client_id`/`client_secret`
//! fields) or an HTTP Basic header, fixed per endpoint instance.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

use common::Secret;

use crate::error::AuthError;
use crate::token::default_token_type;

/// How the client authenticates to the token endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EndpointAuth {
    /// `client_id` and `client_secret` as form body fields
    #[default]
    Body,
    /// `Authorization: Basic base64(client_id:client_secret)` header,
    /// credential fields omitted from the body
    Basic,
}

/// Client credentials, immutable for the lifetime of a handler.
///
/// Besides authenticating to the provider, these double as key material
/// for at-rest token encryption when that is enabled.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<Secret<String>>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a lifetime in seconds relative to the moment the
/// response is received; the caller converts it to an absolute instant
/// when constructing or updating a `Token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Seconds until the access token expires (relative, not absolute)
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

/// A provider's token endpoint plus its fixed authentication mode.
pub struct TokenEndpoint {
    url: String,
    auth: EndpointAuth,
}

impl TokenEndpoint {
    pub fn new(url: impl Into<String>, auth: EndpointAuth) -> Self {
        Self {
            url: url.into(),
            auth,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Exchange an authorization code for tokens (initial flow).
    ///
    /// Obtaining the code requires user interaction and happens outside
    /// this library.
    pub async fn exchange(
        &self,
        http: &reqwest::Client,
        credentials: &Credentials,
        code: &str,
        callback_url: &str,
        scope: &str,
    ) -> Result<TokenResponse, AuthError> {
        let params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", callback_url.to_string()),
            ("scope", scope.to_string()),
        ];
        self.request_token(http, credentials, params).await
    }

    /// Obtain a new access token using a refresh token.
    pub async fn refresh(
        &self,
        http: &reqwest::Client,
        credentials: &Credentials,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        self.request_token(http, credentials, params).await
    }

    async fn request_token(
        &self,
        http: &reqwest::Client,
        credentials: &Credentials,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<TokenResponse, AuthError> {
        let mut request = http.post(&self.url);
        match self.auth {
            EndpointAuth::Body => {
                params.push(("client_id", credentials.client_id.clone()));
                params.push(("client_secret", credentials.client_secret.expose().clone()));
            }
            EndpointAuth::Basic => {
                let pair = format!(
                    "{}:{}",
                    credentials.client_id,
                    credentials.client_secret.expose()
                );
                let header = format!("Basic {}", STANDARD.encode(pair));
                request = request.header(reqwest::header::AUTHORIZATION, header);
            }
        }

        let response = request
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Http(format!("token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(AuthError::Endpoint {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }
}
