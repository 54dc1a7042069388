//! Notification routing.
//!
//! Messages reach the router from two directions: the realtime socket while
//! the app is foregrounded, and platform push delivery otherwise. Both feed
//! the same typed dispatch: handlers registered per kind, a bounded
//! recently-seen set collapsing events that arrive on both paths, and an
//! injected alert surface so the user is notified even when no screen is
//! listening.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::message::{NotificationKind, RealtimeMessage};

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliverySource {
    Socket,
    Push,
}

/// User-facing alert raised alongside handler dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub kind: NotificationKind,
    pub title: String,
    pub body: Option<String>,
}

impl Alert {
    fn from_message(kind: NotificationKind, message: &RealtimeMessage) -> Self {
        match message {
            RealtimeMessage::SystemMessage(notice) => Self {
                kind,
                title: notice.title.clone(),
                body: notice.body.clone(),
            },
            RealtimeMessage::NewOrder(event)
            | RealtimeMessage::OrderCancelled(event)
            | RealtimeMessage::OrderCompleted(event) => {
                let title = match kind {
                    NotificationKind::NewOrder => "New booking request",
                    NotificationKind::OrderCancelled => "Booking cancelled",
                    NotificationKind::OrderCompleted => "Booking completed",
                    NotificationKind::SystemMessage => unreachable!("handled above"),
                };
                Self {
                    kind,
                    title: title.to_string(),
                    body: event.service_name.clone(),
                }
            }
            _ => Self {
                kind,
                title: kind.to_string(),
                body: None,
            },
        }
    }
}

/// Platform alert surface (sound, badge, banner). External collaborator.
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: &Alert);
}

type Handler = Arc<dyn Fn(&RealtimeMessage) + Send + Sync>;

/// Returned by [`NotificationRouter::on`]; pass back to
/// [`NotificationRouter::off`] to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerToken {
    kind: NotificationKind,
    id: u64,
}

/// Bounded recently-seen set: membership test plus FIFO eviction.
struct SeenSet {
    order: VecDeque<String>,
    keys: HashSet<String>,
    capacity: usize,
}

impl SeenSet {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            keys: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Records `key`; returns false if it was already present.
    fn insert(&mut self, key: String) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(evicted) = self.order.pop_front()
        {
            self.keys.remove(&evicted);
        }
        self.keys.insert(key.clone());
        self.order.push_back(key);
        true
    }
}

/// Dispatches inbound notifications to registered handlers by kind.
pub struct NotificationRouter {
    handlers: RwLock<HashMap<NotificationKind, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
    seen: Mutex<SeenSet>,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl NotificationRouter {
    /// How many delivery identities are remembered for deduplication.
    const SEEN_CAPACITY: usize = 128;

    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            seen: Mutex::new(SeenSet::new(Self::SEEN_CAPACITY)),
            alerts: None,
        }
    }

    pub fn with_alert_sink(sink: Arc<dyn AlertSink>) -> Self {
        Self {
            alerts: Some(sink),
            ..Self::new()
        }
    }

    /// Registers a handler for one notification kind.
    pub fn on(
        &self,
        kind: NotificationKind,
        handler: impl Fn(&RealtimeMessage) + Send + Sync + 'static,
    ) -> HandlerToken {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        HandlerToken { kind, id }
    }

    /// Unregisters a handler. Safe to call from inside a handler.
    pub fn off(&self, token: HandlerToken) {
        if let Some(list) = self.handlers.write().get_mut(&token.kind) {
            list.retain(|(id, _)| *id != token.id);
        }
    }

    /// Routes one message: dedup, handler dispatch, alert surface.
    ///
    /// Never panics on input: unknown kinds are logged and dropped, and
    /// protocol-level messages (`connected`, `pong`) are not routed.
    pub fn dispatch(&self, message: RealtimeMessage, source: DeliverySource) {
        let Some(kind) = message.kind() else {
            match &message {
                RealtimeMessage::Unknown { kind, .. } => {
                    warn!(kind = %kind, ?source, "ignoring unrecognized notification kind");
                }
                _ => trace!(?source, "protocol message not routed"),
            }
            return;
        };

        if let Some(key) = message.event_key()
            && !self.seen.lock().insert(key.clone())
        {
            debug!(%key, ?source, "suppressing duplicate delivery");
            return;
        }

        // Snapshot under the read lock, invoke outside it, so a handler may
        // register or unregister without deadlocking mid-dispatch.
        let snapshot: Vec<Handler> = self
            .handlers
            .read()
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        debug!(kind = %kind, ?source, handlers = snapshot.len(), "dispatching notification");
        for handler in &snapshot {
            handler(&message);
        }

        if let Some(sink) = &self.alerts {
            sink.raise(&Alert::from_message(kind, &message));
        }
    }

    /// Entry point for the push path: decodes the push payload (the same
    /// envelope the socket carries) and routes it.
    pub fn handle_push(&self, payload: serde_json::Value) {
        match RealtimeMessage::from_value(payload) {
            Ok(message) => self.dispatch(message, DeliverySource::Push),
            Err(e) => warn!(error = %e, "dropping malformed push payload"),
        }
    }
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}
