//! Scripted transport fake shared by the integration suites.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

use soothe_api::{ApiRequest, ApiResponse, HttpTransport, StatusCode, TransportError};

/// How the fake answers `POST /auth/refresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshBehavior {
    /// Issue [`FakeTransport::RENEWED_ACCESS`] / `refresh-2`.
    Succeed,
    /// Respond 500.
    Fail,
    /// Never respond (exercises the refresh timeout).
    Hang,
}

/// One observed business request.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub path: String,
    pub bearer: Option<String>,
    pub retried: bool,
    pub status: u16,
}

/// In-memory transport. Business endpoints demand the access token the
/// fake was constructed with; a successful refresh issues
/// [`FakeTransport::RENEWED_ACCESS`], so passing that as `valid_access`
/// models a server that honors renewed tokens, while any other value
/// models one that keeps rejecting. The refresh response can be gated so
/// a test holds several callers in the 401 window first.
pub struct FakeTransport {
    valid_access: String,
    refresh_behavior: RefreshBehavior,
    /// When set, the refresh handler waits here before responding.
    refresh_gate: Option<Arc<Notify>>,
    pub refresh_calls: AtomicUsize,
    pub log: Mutex<Vec<SeenRequest>>,
}

impl FakeTransport {
    pub const RENEWED_ACCESS: &str = "access-renewed";

    pub fn new(valid_access: &str, refresh_behavior: RefreshBehavior) -> Arc<Self> {
        Arc::new(Self {
            valid_access: valid_access.to_string(),
            refresh_behavior,
            refresh_gate: None,
            refresh_calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    /// As [`FakeTransport::new`], but the refresh response is held until
    /// the returned gate is notified.
    pub fn gated(valid_access: &str, refresh_behavior: RefreshBehavior) -> (Arc<Self>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let transport = Arc::new(Self {
            valid_access: valid_access.to_string(),
            refresh_behavior,
            refresh_gate: Some(gate.clone()),
            refresh_calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        });
        (transport, gate)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Paths of requests that were rejected with 401, in arrival order.
    pub fn unauthorized_paths(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|r| r.status == 401)
            .map(|r| r.path.clone())
            .collect()
    }

    /// Paths of replayed (post-refresh) requests, in execution order.
    pub fn replayed_paths(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|r| r.retried)
            .map(|r| r.path.clone())
            .collect()
    }

    fn handle_refresh(&self) -> Result<ApiResponse, TransportError> {
        match self.refresh_behavior {
            RefreshBehavior::Succeed => {
                let body = json!({
                    "access_token": Self::RENEWED_ACCESS,
                    "refresh_token": "refresh-2",
                });
                Ok(ApiResponse::new(StatusCode::OK, body.to_string()))
            }
            RefreshBehavior::Fail => Ok(ApiResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"detail":"refresh token revoked"}"#,
            )),
            RefreshBehavior::Hang => Err(TransportError("refresh hung past the test".to_string())),
        }
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        if request.path == "/auth/refresh" {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.refresh_gate {
                gate.notified().await;
            }
            if self.refresh_behavior == RefreshBehavior::Hang {
                // Outlive any refresh timeout a test configures.
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            return self.handle_refresh();
        }

        let authorized = request.bearer() == Some(self.valid_access.as_str());
        let status = if authorized {
            StatusCode::OK
        } else {
            StatusCode::UNAUTHORIZED
        };
        self.log.lock().push(SeenRequest {
            path: request.path.clone(),
            bearer: request.bearer().map(str::to_string),
            retried: request.is_auth_retried(),
            status: status.as_u16(),
        });

        if authorized {
            Ok(ApiResponse::new(status, r#"{"ok":true}"#))
        } else {
            Ok(ApiResponse::new(status, ""))
        }
    }
}

/// Polls `condition` until it holds or two seconds elapse.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within two seconds");
}
