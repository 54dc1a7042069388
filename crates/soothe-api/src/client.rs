//! Authenticated request path.
//!
//! [`AuthenticatedClient::send`] is the single entry point for business
//! endpoints: it injects the current access token, maps response statuses
//! onto the error taxonomy, and on an authorization failure hands the
//! request to the refresh coordinator, which renews credentials once and
//! replays every request queued behind the renewal.

use std::sync::Arc;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::ApiConfig;
use crate::credentials::CredentialStore;
use crate::error::{ApiError, Result};
use crate::refresh::RefreshCoordinator;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

/// Maps a response onto the error taxonomy.
///
/// 2xx and 3xx pass through; everything else becomes the matching
/// [`ApiError`] without retry. A 401 reaching this function is terminal:
/// the refresh path has already run (or was not applicable).
pub(crate) fn classify(response: ApiResponse) -> Result<ApiResponse> {
    let status = response.status;
    if status.is_success() || status.is_redirection() {
        return Ok(response);
    }

    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        StatusCode::FORBIDDEN => ApiError::Forbidden,
        StatusCode::NOT_FOUND => ApiError::NotFound,
        s if s.is_server_error() => ApiError::Server {
            status: s.as_u16(),
            body: response.body_text(),
        },
        s => ApiError::Unexpected {
            status: s.as_u16(),
            body: response.body_text(),
        },
    })
}

/// HTTP client that keeps itself authenticated.
///
/// Cloning is cheap; clones share the transport, credential store and
/// refresh coordinator, so the one-refresh-in-flight guarantee holds across
/// every clone in the process.
#[derive(Clone)]
pub struct AuthenticatedClient {
    transport: Arc<dyn HttpTransport>,
    credentials: CredentialStore,
    refresh: RefreshCoordinator,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: CredentialStore,
        config: &ApiConfig,
    ) -> Self {
        let refresh = RefreshCoordinator::new(
            transport.clone(),
            credentials.clone(),
            config.refresh_timeout(),
        );
        Self {
            transport,
            credentials,
            refresh,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Sends a request with the current access token attached.
    ///
    /// On a 401 the request joins the refresh coordinator's queue and is
    /// replayed with renewed credentials; if renewal is impossible the call
    /// resolves to [`ApiError::Unauthorized`] and the session is logged out.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request = request.with_bearer(self.credentials.access_token());

        let response = self
            .transport
            .execute(request.clone())
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if response.status == StatusCode::UNAUTHORIZED && !request.auth_retried {
            debug!(path = %request.path, "access token rejected, renewing credentials");
            return self.refresh.refresh_and_retry(request.retried()).await;
        }

        classify(response)
    }

    /// Sends a request and deserializes the response body as JSON.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json()?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: impl Into<String>) -> Result<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: impl Into<String>,
        body: serde_json::Value,
    ) -> Result<T> {
        self.send_json(ApiRequest::post(path, body)).await
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(StatusCode::OK, true)]
    #[case(StatusCode::CREATED, true)]
    #[case(StatusCode::NO_CONTENT, true)]
    #[case(StatusCode::NOT_MODIFIED, true)]
    #[case(StatusCode::BAD_REQUEST, false)]
    #[case(StatusCode::FORBIDDEN, false)]
    #[case(StatusCode::NOT_FOUND, false)]
    #[case(StatusCode::INTERNAL_SERVER_ERROR, false)]
    fn classify_success_window(#[case] status: StatusCode, #[case] ok: bool) {
        let result = classify(ApiResponse::new(status, ""));
        assert_eq!(result.is_ok(), ok);
    }

    #[rstest]
    #[case(StatusCode::UNAUTHORIZED)]
    #[case(StatusCode::FORBIDDEN)]
    #[case(StatusCode::NOT_FOUND)]
    fn classify_maps_known_statuses(#[case] status: StatusCode) {
        let err = classify(ApiResponse::new(status, "")).unwrap_err();
        match status {
            StatusCode::UNAUTHORIZED => assert!(matches!(err, ApiError::Unauthorized)),
            StatusCode::FORBIDDEN => assert!(matches!(err, ApiError::Forbidden)),
            StatusCode::NOT_FOUND => assert!(matches!(err, ApiError::NotFound)),
            _ => unreachable!(),
        }
    }

    #[test]
    fn classify_keeps_body_for_diagnostics() {
        let err = classify(ApiResponse::new(
            StatusCode::BAD_GATEWAY,
            r#"{"detail":"upstream down"}"#,
        ))
        .unwrap_err();
        match err {
            ApiError::Server { status, body } => {
                assert_eq!(status, 502);
                assert!(body.contains("upstream down"));
            }
            other => panic!("expected server error, got {other:?}"),
        }

        let err = classify(ApiResponse::new(StatusCode::IM_A_TEAPOT, "short and stout")).unwrap_err();
        match err {
            ApiError::Unexpected { status, body } => {
                assert_eq!(status, 418);
                assert_eq!(body, "short and stout");
            }
            other => panic!("expected unexpected error, got {other:?}"),
        }
    }
}
