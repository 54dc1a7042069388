//! HTTP transport seam.
//!
//! Business logic never talks to `reqwest` directly; it goes through the
//! [`HttpTransport`] trait with owned request/response types, so tests can
//! inject scripted fakes and the client logic stays free of I/O concerns.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use thiserror::Error;
use tracing::warn;

use crate::config::ApiConfig;

/// Transport-level failure: no usable response was received.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

/// An outbound request descriptor.
///
/// Requests are cloneable so an authorization-rejected request can be
/// replayed verbatim once credentials are renewed. Callers must not set the
/// `Authorization` header themselves; the client injects the bearer token
/// at the moment the request is executed.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path joined onto the configured base URL, starting with `/`.
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub(crate) bearer: Option<String>,
    /// Set once the request has been retried after a token refresh, so a
    /// renewed 401 surfaces as `Unauthorized` instead of looping.
    pub(crate) auth_retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            bearer: None,
            auth_retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        let mut request = Self::new(Method::POST, path);
        request.body = Some(body);
        request
    }

    pub(crate) fn with_bearer(mut self, bearer: Option<String>) -> Self {
        self.bearer = bearer;
        self
    }

    pub(crate) fn retried(mut self) -> Self {
        self.auth_retried = true;
        self
    }

    /// The bearer token injected by the client, if any. Transport
    /// implementations read this to populate the `Authorization` header.
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }

    /// Whether this request is a post-refresh replay.
    pub fn is_auth_retried(&self) -> bool {
        self.auth_retried
    }
}

/// An inbound response: status plus raw body bytes.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Deserializes the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes a single HTTP exchange.
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Production transport backed by a shared `reqwest` client.
pub struct ReqwestTransport {
    base_url: String,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ApiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|error| {
                warn!(error = %error, "failed to build HTTP client; falling back to defaults");
                reqwest::Client::new()
            });

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self.client.request(request.method.clone(), &url);
        if let Some(bearer) = &request.bearer {
            builder = builder.bearer_auth(bearer);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        Ok(ApiResponse::new(status, body.to_vec()))
    }
}
