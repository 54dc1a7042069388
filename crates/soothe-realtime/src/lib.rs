//! soothe-realtime: live notification delivery for the soothe marketplace
//! apps.
//!
//! A persistent WebSocket carries notifications while the app is in the
//! foreground; platform push covers the rest. The channel keeps itself
//! alive with heartbeats and reconnects with capped exponential backoff
//! when the connection drops, and both delivery paths converge on one
//! typed router so a screen registers for a notification kind exactly
//! once, wherever the event came from.
//!
//! ## Core Types
//!
//! - [`RealtimeChannel`] - connection lifecycle, heartbeat, reconnection
//! - [`ConnectionActivator`] - foreground/login driven connect/disconnect
//! - [`NotificationRouter`] - kind-keyed dispatch with cross-path dedup
//! - [`RealtimeMessage`] - decoded server messages
//! - [`SocketConnector`] - transport seam (production:
//!   [`TungsteniteConnector`])

pub mod activator;
pub mod channel;
pub mod message;
pub mod router;
pub mod socket;

pub use activator::{AppPhase, ConnectionActivator};
pub use channel::{
    ChannelError, ConnectionState, RealtimeChannel, RealtimeConfig, ReconnectPolicy,
};
pub use message::{
    ClientMessage, DecodeError, NotificationKind, OrderEvent, RealtimeMessage, SystemNotice,
};
pub use router::{Alert, AlertSink, DeliverySource, HandlerToken, NotificationRouter};
pub use socket::{SocketConnector, SocketError, SocketEvent, SocketLink, TungsteniteConnector};
