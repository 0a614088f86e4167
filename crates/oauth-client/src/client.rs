//! Request dispatch with token attachment and bounded reauthentication

use std::path::{Path, PathBuf};

use reqwest::header::HeaderMap;
use reqwest::{Method, Response, StatusCode};
use tracing::warn;

use oauth_token::{
    AuthError, Credentials, DEFAULT_EXPIRY_BUFFER_SECS, EndpointAuth, HandlerConfig, TokenHandler,
    TokenState, default_token_file,
};

use crate::error::{Error, Result};

/// Construction parameters for an `OAuthClient`.
///
/// `new` fills the customary defaults (body credentials at the token
/// endpoint, encrypted persistence, derived file name, 10 s expiry
/// buffer); the fields are public for the cases that differ. The token
/// directory is always explicit.
pub struct ClientConfig {
    /// Base URL of the resource server, e.g. `https://api.example.com`
    pub base_url: String,
    /// Token endpoint: a path resolved against `base_url` (the usual
    /// case, e.g. `/oauth/token`) or an absolute http(s) URL when the
    /// provider issues tokens from a different host
    pub token_endpoint: String,
    pub credentials: Credentials,
    pub endpoint_auth: EndpointAuth,
    /// Encrypt the persisted token under the client credentials
    pub encrypt: bool,
    /// Directory holding the token file
    pub token_dir: PathBuf,
    /// File name override; derived from the resource host and client id
    /// when `None`
    pub token_file: Option<String>,
    pub expiry_buffer_secs: u64,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        token_endpoint: impl Into<String>,
        credentials: Credentials,
        token_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token_endpoint: token_endpoint.into(),
            credentials,
            endpoint_auth: EndpointAuth::Body,
            encrypt: true,
            token_dir: token_dir.into(),
            token_file: None,
            expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
        }
    }
}

/// Resource client that keeps its bearer token valid across calls.
///
/// Every verb ensures a valid access token before the request leaves,
/// attaches `Authorization: Bearer …`, and on a 401 refreshes once and
/// resends the identical request once. A second consecutive 401 fails the
/// call with [`Error::Unauthorized`]; every other status is returned to
/// the caller unmodified.
pub struct OAuthClient {
    base_url: String,
    handler: TokenHandler,
    http: reqwest::Client,
}

impl OAuthClient {
    /// Validate the configuration, restore any persisted token, and build
    /// the client. One `reqwest::Client` is shared between token endpoint
    /// and resource traffic.
    pub async fn connect(config: ClientConfig) -> common::Result<Self> {
        let base = reqwest::Url::parse(&config.base_url).map_err(|e| {
            common::Error::Config(format!("invalid base URL {}: {e}", config.base_url))
        })?;
        if base.scheme() != "https" && base.scheme() != "http" {
            return Err(common::Error::Config(format!(
                "base URL must be http(s), got {}",
                config.base_url
            )));
        }
        let host = base.host_str().ok_or_else(|| {
            common::Error::Config(format!("base URL has no host: {}", config.base_url))
        })?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let token_url = if config.token_endpoint.starts_with("http://")
            || config.token_endpoint.starts_with("https://")
        {
            config.token_endpoint
        } else {
            format!("{base_url}{}", config.token_endpoint)
        };

        // The file name is keyed to the resource host, so two clients for
        // different providers can share a token directory.
        let token_file = config
            .token_file
            .or_else(|| Some(default_token_file(host, &config.credentials.client_id)));

        let http = reqwest::Client::new();
        let handler_config = HandlerConfig {
            token_url,
            auth: config.endpoint_auth,
            credentials: config.credentials,
            encrypt: config.encrypt,
            token_dir: config.token_dir,
            token_file,
            expiry_buffer_secs: config.expiry_buffer_secs,
        };
        let handler = TokenHandler::connect(handler_config, http.clone()).await?;

        Ok(Self {
            base_url,
            handler,
            http,
        })
    }

    /// Exchange an authorization code for the initial token.
    ///
    /// Obtaining the code requires user interaction and happens outside
    /// this library.
    pub async fn authorize(&self, code: &str, callback_url: &str, scope: &str) -> Result<()> {
        self.handler.exchange(code, callback_url, scope).await?;
        Ok(())
    }

    /// Force a token refresh now, outside any request.
    pub async fn refresh(&self) -> Result<()> {
        self.handler.refresh().await?;
        Ok(())
    }

    /// Lifecycle state of the underlying token.
    pub async fn token_state(&self) -> TokenState {
        self.handler.state().await
    }

    /// Path of the persisted token file.
    pub fn token_path(&self) -> &Path {
        self.handler.token_path()
    }

    /// GET `path` with an optional query map.
    pub async fn get(
        &self,
        path: &str,
        query: Option<&[(&str, &str)]>,
        headers: HeaderMap,
    ) -> Result<Response> {
        self.dispatch(Method::GET, path, query, None, &headers).await
    }

    /// POST a raw body to `path`.
    pub async fn post(
        &self,
        path: &str,
        body: impl Into<Vec<u8>>,
        headers: HeaderMap,
    ) -> Result<Response> {
        self.dispatch(Method::POST, path, None, Some(body.into()), &headers)
            .await
    }

    /// PUT a raw body to `path`.
    pub async fn put(
        &self,
        path: &str,
        body: impl Into<Vec<u8>>,
        headers: HeaderMap,
    ) -> Result<Response> {
        self.dispatch(Method::PUT, path, None, Some(body.into()), &headers)
            .await
    }

    /// PATCH a raw body at `path`.
    pub async fn patch(
        &self,
        path: &str,
        body: impl Into<Vec<u8>>,
        headers: HeaderMap,
    ) -> Result<Response> {
        self.dispatch(Method::PATCH, path, None, Some(body.into()), &headers)
            .await
    }

    /// DELETE `path`.
    pub async fn delete(&self, path: &str, headers: HeaderMap) -> Result<Response> {
        self.dispatch(Method::DELETE, path, None, None, &headers)
            .await
    }

    /// One authenticated dispatch: proactive token check, send, and at
    /// most one 401-triggered refresh-and-resend. Statuses other than 401
    /// are the caller's business.
    async fn dispatch(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, &str)]>,
        body: Option<Vec<u8>>,
        headers: &HeaderMap,
    ) -> Result<Response> {
        let access = self.handler.ensure_valid().await?;
        let url = format!("{}{path}", self.base_url);

        let response = self.send(&method, &url, query, &body, headers, &access).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(method = %method, path, "resource request unauthorized, refreshing token and retrying once");
        self.handler.refresh().await?;
        let access = self
            .handler
            .access_token()
            .await
            .ok_or(AuthError::NoToken)?;

        let retry = self.send(&method, &url, query, &body, headers, &access).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            let body = retry
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::Unauthorized { body });
        }
        Ok(retry)
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        query: Option<&[(&str, &str)]>,
        body: &Option<Vec<u8>>,
        headers: &HeaderMap,
        access_token: &str,
    ) -> Result<Response> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .headers(headers.clone())
            .bearer_auth(access_token);
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.body(body.clone());
        }
        request
            .send()
            .await
            .map_err(|e| Error::Http(format!("{method} {url}: {e}")))
    }
}
