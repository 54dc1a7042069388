//! Session lifecycle: login, logout, push registration.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::client::{classify, AuthenticatedClient};
use crate::config::ApiConfig;
use crate::credentials::{CredentialStore, TokenGrant};
use crate::error::{ApiError, Result};
use crate::transport::{ApiRequest, HttpTransport};

/// Device details sent along with a platform push token.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Platform identifier, e.g. `ios` or `android`.
    pub platform: String,
    pub device_model: String,
}

/// Owns the auth flow around an [`AuthenticatedClient`].
#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn HttpTransport>,
    credentials: CredentialStore,
    client: AuthenticatedClient,
}

impl Session {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: CredentialStore,
        config: &ApiConfig,
    ) -> Self {
        let client = AuthenticatedClient::new(transport.clone(), credentials.clone(), config);
        Self {
            transport,
            credentials,
            client,
        }
    }

    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Exchanges credentials for a token pair and stores it.
    ///
    /// Login is an unauthenticated endpoint, so it goes straight to the
    /// transport: a 401 here means a bad password, not an expired token,
    /// and must not trigger the refresh path.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let request = ApiRequest::post(
            "/auth/login",
            json!({ "email": email, "password": password }),
        );
        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let response = classify(response)?;
        let grant: TokenGrant = response.json()?;

        self.credentials.set(grant.into());
        info!("login succeeded");
        Ok(())
    }

    /// Revokes the session server-side (best effort) and clears local
    /// credentials regardless of the outcome.
    pub async fn logout(&self) {
        let request = ApiRequest::post("/auth/logout", json!({}));
        if let Err(e) = self.client.send(request).await {
            debug!(error = %e, "server-side logout failed, clearing local session anyway");
        }
        self.credentials.clear();
        info!("logged out");
    }

    /// Registers the platform push token for this device so notifications
    /// keep arriving while the app is backgrounded and the socket is down.
    /// Call once a token is obtained after login, and again whenever the
    /// platform rotates it.
    pub async fn register_push_token(&self, token: &str, device: &DeviceInfo) -> Result<()> {
        let request = ApiRequest::post(
            "/notifications/push-token",
            json!({
                "token": token,
                "platform": device.platform,
                "device_model": device.device_model,
            }),
        );
        self.client.send(request).await?;
        debug!(platform = %device.platform, "push token registered");
        Ok(())
    }
}
