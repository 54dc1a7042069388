//! Credential renewal with request replay.
//!
//! However many requests fail authorization in the same window, exactly one
//! `POST /auth/refresh` goes out; every failed request waits in a FIFO queue
//! and is replayed with the renewed token, or rejected with `Unauthorized`
//! when renewal fails. The queue lives inside the `Refreshing` state, so a
//! non-empty queue while idle is unrepresentable.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::client::classify;
use crate::credentials::{CredentialPair, CredentialStore, TokenGrant};
use crate::error::{ApiError, Result};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

/// A request parked behind the in-flight refresh.
struct PendingRequest {
    request: ApiRequest,
    done: oneshot::Sender<Result<ApiResponse>>,
}

enum RefreshState {
    Idle,
    Refreshing { waiters: VecDeque<PendingRequest> },
}

/// Collapses concurrent credential renewals into a single network call.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn HttpTransport>,
    credentials: CredentialStore,
    refresh_timeout: Duration,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: CredentialStore,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                credentials,
                refresh_timeout,
                state: Mutex::new(RefreshState::Idle),
            }),
        }
    }

    /// Parks `request` until the refresh settles, then returns its replayed
    /// outcome. The first arrival while idle launches the refresh; later
    /// arrivals only enqueue.
    pub(crate) async fn refresh_and_retry(&self, request: ApiRequest) -> Result<ApiResponse> {
        let (done, outcome) = oneshot::channel();
        let pending = PendingRequest { request, done };

        let launch = {
            let mut state = self.inner.state.lock();
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push_back(pending);
                    false
                }
                RefreshState::Idle => {
                    let mut waiters = VecDeque::new();
                    waiters.push_back(pending);
                    *state = RefreshState::Refreshing { waiters };
                    true
                }
            }
        };

        if launch {
            let coordinator = self.clone();
            tokio::spawn(async move { coordinator.run_refresh().await });
        }

        // The settlement path always completes every waiter; a dropped
        // sender can only mean the refresh task died, which is terminal.
        outcome.await.unwrap_or(Err(ApiError::Unauthorized))
    }

    /// Performs the refresh call and settles every queued waiter.
    async fn run_refresh(&self) {
        let renewed = self.execute_refresh().await;

        let waiters = {
            let mut state = self.inner.state.lock();
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => VecDeque::new(),
            }
        };

        match renewed {
            Some(pair) => {
                self.inner.credentials.set(pair.clone());
                info!(waiters = waiters.len(), "credentials renewed, replaying queued requests");
                for pending in waiters {
                    let request = pending
                        .request
                        .with_bearer(Some(pair.access_token.clone()));
                    let result = match self.inner.transport.execute(request).await {
                        Ok(response) => classify(response),
                        Err(e) => Err(ApiError::Network(e.to_string())),
                    };
                    let _ = pending.done.send(result);
                }
            }
            None => {
                self.inner.credentials.clear();
                warn!(waiters = waiters.len(), "credential renewal failed, session logged out");
                for pending in waiters {
                    let _ = pending.done.send(Err(ApiError::Unauthorized));
                }
            }
        }
    }

    /// Runs the refresh network call; `None` means renewal is impossible.
    async fn execute_refresh(&self) -> Option<CredentialPair> {
        let Some(refresh_token) = self.inner.credentials.refresh_token() else {
            debug!("no refresh token on hand, skipping renewal call");
            return None;
        };

        let request = ApiRequest::post("/auth/refresh", json!({ "refresh_token": refresh_token }));
        let response = tokio::time::timeout(
            self.inner.refresh_timeout,
            self.inner.transport.execute(request),
        )
        .await;

        match response {
            Err(_) => {
                warn!(timeout_secs = self.inner.refresh_timeout.as_secs(), "refresh call timed out");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "refresh call failed at transport level");
                None
            }
            Ok(Ok(response)) if response.status.is_success() => {
                match response.json::<TokenGrant>() {
                    Ok(grant) => Some(grant.into()),
                    Err(e) => {
                        warn!(error = %e, "refresh response body did not parse");
                        None
                    }
                }
            }
            Ok(Ok(response)) => {
                warn!(status = %response.status, "refresh call rejected");
                None
            }
        }
    }
}
