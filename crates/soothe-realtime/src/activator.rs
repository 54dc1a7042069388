//! Lifecycle-aware channel activation.
//!
//! The socket is a foreground luxury: while the app is backgrounded, push
//! delivery covers notifications and holding a connection open only burns
//! battery. The activator watches the app phase (reported by the embedding
//! shell) and credential presence, and keeps the channel open exactly when
//! both say it should be.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use soothe_api::CredentialStore;

use crate::channel::RealtimeChannel;

/// Application lifecycle phase, as reported by the embedding shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Foreground,
    /// Backgrounded or inactive; notifications arrive via push.
    Background,
}

/// Drives [`RealtimeChannel::connect`] / [`RealtimeChannel::disconnect`]
/// from app-phase and login/logout transitions.
pub struct ConnectionActivator {
    cancel: CancellationToken,
}

impl ConnectionActivator {
    /// Spawns the activation task. The channel is (re)evaluated immediately
    /// with the current phase and credentials, then on every change of
    /// either. The task stops when the phase sender is dropped or
    /// [`ConnectionActivator::shutdown`] is called.
    pub fn spawn(
        channel: Arc<RealtimeChannel>,
        credentials: &CredentialStore,
        mut phases: watch::Receiver<AppPhase>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut auth = credentials.subscribe();

        tokio::spawn(async move {
            loop {
                let phase = *phases.borrow_and_update();
                let logged_in = auth.borrow_and_update().is_some();

                if phase == AppPhase::Foreground && logged_in {
                    channel.connect();
                } else {
                    channel.disconnect();
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    changed = phases.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = auth.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("connection activator stopped");
        });

        Self { cancel }
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for ConnectionActivator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
