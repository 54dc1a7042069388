//! The realtime connection.
//!
//! One channel owns at most one live socket. A long-lived runner task
//! drives the lifecycle: connect, pump messages into the router while
//! sending heartbeats, and on abnormal loss reconnect with capped
//! exponential backoff until the attempt budget runs out. An explicit
//! `disconnect()` cancels the runner, which makes heartbeat and reconnect
//! timers inert immediately and suppresses any further reconnection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use soothe_api::CredentialStore;

use crate::message::{ClientMessage, RealtimeMessage};
use crate::router::{DeliverySource, NotificationRouter};
use crate::socket::{SocketConnector, SocketError, SocketEvent, SocketLink};

/// Lifecycle states of the realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    Closing,
}

/// Reconnection behavior after an abnormal close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Attempts before giving up; a later explicit `connect()` starts over.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Cap on the computed delay.
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-indexed):
    /// `base * 2^(attempt-1)`, capped. The shift is checked so a
    /// misconfigured attempt count saturates instead of overflowing.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Configuration for the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Notification endpoint without credentials
    /// (e.g. `wss://api.soothe.app/api/v1/notifications/ws`).
    pub ws_url: String,
    pub heartbeat_interval_secs: u64,
    pub reconnect: ReconnectPolicy,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://api.soothe.app/api/v1/notifications/ws".to_string(),
            heartbeat_interval_secs: 30,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl RealtimeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Builds the connect URL with the access token as query credential.
    fn endpoint(&self, token: &str) -> Result<String, ChannelError> {
        let mut url = url::Url::parse(&self.ws_url)
            .map_err(|e| ChannelError::InvalidEndpoint(e.to_string()))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url.into())
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    /// `send` was called while the connection was not open. Callers treat
    /// this as a soft failure; nothing is queued.
    #[error("channel is not open")]
    NotOpen,
    #[error("invalid websocket endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("failed to encode outbound message: {0}")]
    Encode(String),
    #[error(transparent)]
    Socket(#[from] SocketError),
}

/// Why the open-link loop ended.
enum LinkExit {
    /// Explicit disconnect; do not reconnect.
    Manual,
    /// Server- or network-initiated loss; eligible for reconnect.
    Lost,
}

struct RunnerHandle {
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<String>,
}

/// Maintains the persistent notification socket.
pub struct RealtimeChannel {
    shared: Arc<Shared>,
    runner: parking_lot::Mutex<Option<RunnerHandle>>,
}

/// State shared with the runner task.
struct Shared {
    connector: Arc<dyn SocketConnector>,
    credentials: CredentialStore,
    config: RealtimeConfig,
    router: Arc<NotificationRouter>,
    state: watch::Sender<ConnectionState>,
    manual_close: AtomicBool,
    errors: broadcast::Sender<SocketError>,
    /// Bumped by every `connect()`. A runner that no longer owns the
    /// current epoch has been superseded and must not publish state, or a
    /// winding-down runner could stomp its replacement's transitions.
    epoch: AtomicU64,
}

impl Shared {
    fn set_state(&self, epoch: u64, next: ConnectionState) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return;
        }
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(state = ?next, "realtime channel state changed");
        }
    }

    fn report_error(&self, error: SocketError) {
        let _ = self.errors.send(error);
    }

    /// Decodes and routes one inbound frame. Malformed payloads are logged
    /// and dropped; protocol acknowledgements stop here.
    fn handle_text(&self, text: &str) {
        match RealtimeMessage::parse(text) {
            Ok(RealtimeMessage::Pong { .. }) => trace!("heartbeat acknowledged"),
            Ok(RealtimeMessage::Connected) => debug!("server confirmed realtime session"),
            Ok(message) => self.router.dispatch(message, DeliverySource::Socket),
            Err(e) => warn!(error = %e, "dropping malformed realtime payload"),
        }
    }
}

impl RealtimeChannel {
    pub fn new(
        connector: Arc<dyn SocketConnector>,
        credentials: CredentialStore,
        config: RealtimeConfig,
        router: Arc<NotificationRouter>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Closed);
        let (errors, _) = broadcast::channel(16);
        Self {
            shared: Arc::new(Shared {
                connector,
                credentials,
                config,
                router,
                state,
                manual_close: AtomicBool::new(false),
                errors,
                epoch: AtomicU64::new(0),
            }),
            runner: parking_lot::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Watches lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Subscribes to transport errors. Purely observational: errors do not
    /// change state by themselves, the close that follows them does.
    pub fn subscribe_errors(&self) -> broadcast::Receiver<SocketError> {
        self.shared.errors.subscribe()
    }

    /// Opens the connection. A no-op while already connecting or open; a
    /// fresh call after the channel gave up reconnecting starts over with
    /// the attempt counter at zero. Without credentials this does nothing:
    /// the activator calls again after login.
    pub fn connect(&self) {
        let mut runner = self.runner.lock();
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Open => {
                debug!("connect ignored, channel already active");
                return;
            }
            ConnectionState::Closed | ConnectionState::Closing => {}
        }

        // A runner parked in backoff (or winding down) is superseded.
        if let Some(stale) = runner.take() {
            stale.cancel.cancel();
        }

        if !self.shared.credentials.is_authenticated() {
            debug!("connect ignored, no credentials");
            return;
        }

        self.shared.manual_close.store(false, Ordering::SeqCst);
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *runner = Some(RunnerHandle {
            cancel: cancel.clone(),
            outbound: outbound_tx,
        });

        let shared = self.shared.clone();
        tokio::spawn(run(shared, epoch, outbound_rx, cancel));
    }

    /// Closes the connection and suppresses reconnection. Idempotent; all
    /// pending heartbeat and reconnect timers become inert immediately.
    pub fn disconnect(&self) {
        self.shared.manual_close.store(true, Ordering::SeqCst);
        if let Some(handle) = self.runner.lock().take() {
            debug!("realtime channel disconnect requested");
            handle.cancel.cancel();
        }
    }

    /// Serializes and transmits `message` if the connection is open;
    /// otherwise fails with [`ChannelError::NotOpen`] without queueing.
    pub fn send(&self, message: &ClientMessage) -> Result<(), ChannelError> {
        if self.state() != ConnectionState::Open {
            return Err(ChannelError::NotOpen);
        }
        let payload =
            serde_json::to_string(message).map_err(|e| ChannelError::Encode(e.to_string()))?;
        let runner = self.runner.lock();
        match runner.as_ref() {
            Some(handle) if handle.outbound.send(payload).is_ok() => Ok(()),
            _ => Err(ChannelError::NotOpen),
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        if let Some(handle) = self.runner.lock().take() {
            handle.cancel.cancel();
        }
    }
}

/// Runner task: one connection attempt per loop iteration, with backoff
/// between iterations after abnormal losses.
async fn run(
    shared: Arc<Shared>,
    epoch: u64,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // Latest token at the moment of use; a token rotated by a refresh
        // is picked up on the next attempt without re-wiring.
        let Some(token) = shared.credentials.access_token() else {
            debug!("no access token, stopping realtime runner");
            break;
        };
        let url = match shared.config.endpoint(&token) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, "invalid realtime endpoint");
                break;
            }
        };

        shared.set_state(epoch, ConnectionState::Connecting);
        info!(attempt, "connecting realtime channel");

        let connected = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            result = shared.connector.connect(&url) => result,
        };

        match connected {
            Ok(link) => {
                shared.set_state(epoch, ConnectionState::Open);
                attempt = 0;
                info!("realtime channel open");

                match drive_open(&shared, epoch, link, &mut outbound_rx, &cancel).await {
                    LinkExit::Manual => {
                        shared.set_state(epoch, ConnectionState::Closed);
                        break;
                    }
                    LinkExit::Lost => shared.set_state(epoch, ConnectionState::Closed),
                }
            }
            Err(e) => {
                warn!(error = %e, "realtime connect failed");
                shared.report_error(e);
                shared.set_state(epoch, ConnectionState::Closed);
            }
        }

        if shared.manual_close.load(Ordering::SeqCst) {
            break;
        }

        attempt += 1;
        if attempt > shared.config.reconnect.max_attempts {
            // Give up; push delivery covers the gap until the next explicit
            // connect (e.g. the app returning to the foreground).
            warn!(
                max_attempts = shared.config.reconnect.max_attempts,
                "reconnect budget exhausted, going quiet"
            );
            break;
        }

        let delay = shared.config.reconnect.delay_for_attempt(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_state(epoch, ConnectionState::Closed);
    debug!("realtime runner stopped");
}

/// Pumps one open link: heartbeats out, messages in, until loss or cancel.
async fn drive_open(
    shared: &Shared,
    epoch: u64,
    mut link: Box<dyn SocketLink>,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> LinkExit {
    let heartbeat = shared.config.heartbeat_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                shared.set_state(epoch, ConnectionState::Closing);
                link.close().await;
                return LinkExit::Manual;
            }

            _ = ticker.tick() => {
                // Liveness: a connection that has gone quiet for two full
                // heartbeat intervals is treated as dead rather than
                // waiting for TCP to notice.
                if last_inbound.elapsed() > heartbeat * 2 {
                    warn!("no traffic for two heartbeat intervals, dropping connection");
                    link.close().await;
                    return LinkExit::Lost;
                }
                let ping = ClientMessage::Ping { timestamp: Utc::now() };
                if let Ok(payload) = serde_json::to_string(&ping) {
                    if let Err(e) = link.send_text(payload).await {
                        warn!(error = %e, "heartbeat send failed");
                        shared.report_error(e);
                        return LinkExit::Lost;
                    }
                    trace!("sent heartbeat ping");
                }
            }

            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(payload) => {
                        if let Err(e) = link.send_text(payload).await {
                            warn!(error = %e, "outbound send failed");
                            shared.report_error(e);
                            return LinkExit::Lost;
                        }
                    }
                    // Sender side gone: the channel handle was dropped.
                    None => {
                        link.close().await;
                        return LinkExit::Manual;
                    }
                }
            }

            event = link.next_event() => {
                match event {
                    Some(Ok(SocketEvent::Text(text))) => {
                        last_inbound = Instant::now();
                        shared.handle_text(&text);
                    }
                    Some(Ok(SocketEvent::Closed { code, reason })) => {
                        info!(?code, %reason, "server closed realtime connection");
                        return LinkExit::Lost;
                    }
                    Some(Err(e)) => {
                        // Errors are reported but do not flip state; the
                        // close that follows drives the transition.
                        warn!(error = %e, "socket error");
                        shared.report_error(e);
                    }
                    None => {
                        info!("socket stream ended");
                        return LinkExit::Lost;
                    }
                }
            }
        }
    }
}
