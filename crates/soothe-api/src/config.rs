use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the API client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL all request paths are joined onto, without a trailing slash
    /// (e.g. `https://api.soothe.app/api/v1`).
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Hard timeout for the token refresh call in seconds. Expiry counts as
    /// a failed refresh, so a hung refresh can never wedge queued requests.
    pub refresh_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.soothe.app/api/v1".to_string(),
            request_timeout_secs: 30,
            refresh_timeout_secs: 15,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}
