//! Authenticated JSON REST client shared by the provider integrations.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{Client, Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::EnvSource;
use crate::error::{ApiError, Result};

/// Characters escaped inside a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Percent-encodes `value` so it stays one path segment.
#[must_use]
pub fn path_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

/// How the token is presented in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `Authorization: <prefix> <token>`.
    Prefixed(&'static str),
}

impl AuthScheme {
    fn header_value(self, token: &str) -> String {
        match self {
            Self::Bearer => format!("Bearer {token}"),
            Self::Prefixed(prefix) => format!("{prefix} {token}"),
        }
    }
}

/// Settings for a [`ResourceClient`].
#[derive(Clone)]
pub struct ApiConfig {
    /// Provider name used in errors and logs.
    pub provider: &'static str,
    /// Base URL, without trailing slash.
    pub base_url: String,
    /// API token.
    pub token: String,
    /// Header scheme.
    pub auth: AuthScheme,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// JSON REST client for one provider.
#[derive(Clone)]
pub struct ResourceClient {
    /// HTTP client.
    client: Client,
    /// Provider name.
    provider: &'static str,
    /// Base URL.
    base_url: String,
    /// Prepared `Authorization` header value.
    authorization: String,
}

impl fmt::Debug for ResourceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ResourceClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Client {
                provider: config.provider.to_string(),
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            authorization: config.auth.header_value(&config.token),
        })
    }

    /// Creates a client whose token is read from `token_var`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingToken` if the token is unset or blank,
    /// or an error if the HTTP client cannot be created.
    pub fn from_credentials(
        provider: &'static str,
        token_var: &str,
        base_url: impl Into<String>,
        auth: AuthScheme,
        timeout: Duration,
        env: &EnvSource<'_>,
    ) -> Result<Self> {
        let token = env.require_token(token_var)?;
        Self::new(ApiConfig {
            provider,
            base_url: base_url.into(),
            token: token.to_string(),
            auth,
            timeout,
        })
    }

    /// Provider name.
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a request and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Transport` when no response arrives,
    /// `ApiError::Status` for any status of 300 or above and
    /// `ApiError::Decode` when the body does not match `T`.
    pub async fn request<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let text = self.send(method.clone(), path, body).await?;
        trace!("{} {method} {path} response: {} bytes", self.provider, text.len());

        serde_json::from_str(&text).map_err(|e| {
            ApiError::Decode {
                provider: self.provider.to_string(),
                method: method.to_string(),
                path: path.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Sends a request and ignores the response body.
    ///
    /// # Errors
    ///
    /// Same as [`Self::request`], minus decoding.
    pub async fn request_empty<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        self.send(method, path, body).await.map(|_| ())
    }

    /// `GET` helper.
    ///
    /// # Errors
    ///
    /// Same as [`Self::request`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request::<(), T>(Method::GET, path, None).await
    }

    /// `POST` helper.
    ///
    /// # Errors
    ///
    /// Same as [`Self::request`].
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    async fn send<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<String>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = format!("{}{path}", self.base_url);
        debug!("{} {method} {path}", self.provider);

        let mut builder = self
            .client
            .request(method.clone(), &url)
            .header(header::AUTHORIZATION, &self.authorization)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| ApiError::Transport {
            provider: self.provider.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| ApiError::Transport {
            provider: self.provider.to_string(),
            method: method.to_string(),
            path: path.to_string(),
            message: format!("Failed to read response body: {e}"),
        })?;

        if status.as_u16() >= 300 {
            debug!("{} {method} {path} -> {status}", self.provider);
            return Err(ApiError::Status {
                provider: self.provider.to_string(),
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body: text,
            }
            .into());
        }

        Ok(text)
    }
}
