#![allow(dead_code)] // each test binary uses a subset of the fixtures

//! Scripted socket fakes shared by the integration suites.
//!
//! Each accepted connection hands the test a [`LinkProbe`]: a pair of
//! channels to feed inbound frames and observe outbound ones, plus a flag
//! recording that the channel closed the link. Timestamps use
//! `tokio::time::Instant`, so under `start_paused` they reflect virtual
//! time and backoff delays can be asserted exactly.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use soothe_api::{CredentialPair, CredentialStore};
use soothe_realtime::{
    ConnectionState, NotificationRouter, RealtimeChannel, RealtimeConfig, ReconnectPolicy,
    SocketConnector, SocketError, SocketEvent, SocketLink,
};

/// Outcome of one scripted connection attempt.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Accept,
    Refuse,
}

/// Test-side handle to one accepted connection.
pub struct LinkProbe {
    /// Feed inbound events; dropping the sender ends the stream.
    pub inbound: mpsc::UnboundedSender<Result<SocketEvent, SocketError>>,
    /// Observes outbound frames with their (virtual) send time.
    pub sent: mpsc::UnboundedReceiver<(Instant, String)>,
    /// Set once the channel let go of this link (explicit close or drop).
    pub closed: Arc<AtomicBool>,
}

pub struct FakeConnector {
    scripts: Mutex<VecDeque<Script>>,
    probes: mpsc::UnboundedSender<LinkProbe>,
    pub connects: Mutex<Vec<Instant>>,
}

impl FakeConnector {
    pub fn new(scripts: Vec<Script>) -> (Arc<Self>, mpsc::UnboundedReceiver<LinkProbe>) {
        let (probes, probes_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            probes,
            connects: Mutex::new(Vec::new()),
        });
        (connector, probes_rx)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    pub fn push_script(&self, script: Script) {
        self.scripts.lock().push_back(script);
    }

    /// Virtual-time gaps between consecutive connection attempts.
    pub fn connect_deltas(&self) -> Vec<Duration> {
        let connects = self.connects.lock();
        connects.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn SocketLink>, SocketError> {
        self.connects.lock().push(Instant::now());
        let script = self.scripts.lock().pop_front().unwrap_or(Script::Refuse);
        match script {
            Script::Refuse => Err(SocketError::Connect("scripted refusal".to_string())),
            Script::Accept => {
                let (inbound, inbound_rx) = mpsc::unbounded_channel();
                let (sent_tx, sent) = mpsc::unbounded_channel();
                let closed = Arc::new(AtomicBool::new(false));
                let _ = self.probes.send(LinkProbe {
                    inbound,
                    sent,
                    closed: closed.clone(),
                });
                Ok(Box::new(FakeLink {
                    inbound_rx,
                    sent_tx,
                    closed,
                }))
            }
        }
    }
}

struct FakeLink {
    inbound_rx: mpsc::UnboundedReceiver<Result<SocketEvent, SocketError>>,
    sent_tx: mpsc::UnboundedSender<(Instant, String)>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl SocketLink for FakeLink {
    async fn send_text(&mut self, text: String) -> Result<(), SocketError> {
        let _ = self.sent_tx.send((Instant::now(), text));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<SocketEvent, SocketError>> {
        self.inbound_rx.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Drop for FakeLink {
    fn drop(&mut self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

/// A channel wired to scripted sockets, one-second base backoff and a
/// thirty-second heartbeat, logged in as `access-1`.
pub fn scripted_channel(
    scripts: Vec<Script>,
    router: Arc<NotificationRouter>,
) -> (
    Arc<RealtimeChannel>,
    Arc<FakeConnector>,
    mpsc::UnboundedReceiver<LinkProbe>,
    CredentialStore,
) {
    let (connector, probes_rx) = FakeConnector::new(scripts);
    let store = CredentialStore::with_pair(CredentialPair::new("access-1", Some("refresh-1".into())));
    let config = RealtimeConfig {
        ws_url: "wss://example.test/api/v1/notifications/ws".to_string(),
        heartbeat_interval_secs: 30,
        reconnect: ReconnectPolicy {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        },
    };
    let channel = Arc::new(RealtimeChannel::new(
        connector.clone(),
        store.clone(),
        config,
        router,
    ));
    (channel, connector, probes_rx, store)
}

/// Awaits a specific lifecycle state, bounded by five virtual minutes.
pub async fn wait_for_state(
    rx: &mut tokio::sync::watch::Receiver<ConnectionState>,
    want: ConnectionState,
) {
    tokio::time::timeout(Duration::from_secs(300), async {
        loop {
            if *rx.borrow_and_update() == want {
                return;
            }
            rx.changed().await.expect("state sender dropped");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("channel never reached {want:?}"));
}

/// Polls `condition` every ten virtual milliseconds, bounded by five
/// minutes. The step divides every delay the channel schedules, so timer
/// deadlines stay exact under the paused clock.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..30_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within five virtual minutes");
}
