//! Wire messages on the notification channel.
//!
//! The server envelope is `{"type": <kind>, ...kind-specific fields}`. Both
//! the socket and the push path decode into [`RealtimeMessage`], a closed
//! union over the kinds the apps understand plus an explicit
//! [`RealtimeMessage::Unknown`] variant so new server-side kinds degrade to
//! a log line instead of an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Notification kinds routed to application handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    NewOrder,
    OrderCancelled,
    OrderCompleted,
    SystemMessage,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewOrder => "new_order",
            Self::OrderCancelled => "order_cancelled",
            Self::OrderCompleted => "order_completed",
            Self::SystemMessage => "system_message",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload shared by the order lifecycle kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Server-assigned delivery id, stable across socket and push so the
    /// router can collapse double deliveries.
    #[serde(default)]
    pub event_id: Option<String>,
    pub order_id: String,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Free-form announcement from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNotice {
    #[serde(default)]
    pub event_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct PongPayload {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// A decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeMessage {
    NewOrder(OrderEvent),
    OrderCancelled(OrderEvent),
    OrderCompleted(OrderEvent),
    SystemMessage(SystemNotice),
    /// Server acknowledged the connection.
    Connected,
    /// Heartbeat acknowledgement.
    Pong { timestamp: Option<DateTime<Utc>> },
    /// A kind this client version does not understand.
    Unknown { kind: String, payload: Value },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("payload has no string `type` field")]
    MissingType,
}

impl RealtimeMessage {
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self, DecodeError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingType)?
            .to_string();

        let message = match kind.as_str() {
            "new_order" => Self::NewOrder(serde_json::from_value(value)?),
            "order_cancelled" => Self::OrderCancelled(serde_json::from_value(value)?),
            "order_completed" => Self::OrderCompleted(serde_json::from_value(value)?),
            "system_message" => Self::SystemMessage(serde_json::from_value(value)?),
            "connected" => Self::Connected,
            "pong" => {
                let payload: PongPayload = serde_json::from_value(value).unwrap_or_default();
                Self::Pong {
                    timestamp: payload.timestamp,
                }
            }
            _ => Self::Unknown {
                kind,
                payload: value,
            },
        };
        Ok(message)
    }

    /// The routing kind, or `None` for protocol-level and unknown messages.
    pub fn kind(&self) -> Option<NotificationKind> {
        match self {
            Self::NewOrder(_) => Some(NotificationKind::NewOrder),
            Self::OrderCancelled(_) => Some(NotificationKind::OrderCancelled),
            Self::OrderCompleted(_) => Some(NotificationKind::OrderCompleted),
            Self::SystemMessage(_) => Some(NotificationKind::SystemMessage),
            Self::Connected | Self::Pong { .. } | Self::Unknown { .. } => None,
        }
    }

    /// Identity used to collapse an event delivered over both the socket
    /// and push. Prefers the server's delivery id; order events without one
    /// fall back to kind + order id.
    pub fn event_key(&self) -> Option<String> {
        let (kind, event_id, order_id) = match self {
            Self::NewOrder(e) | Self::OrderCancelled(e) | Self::OrderCompleted(e) => {
                (self.kind(), e.event_id.as_ref(), Some(&e.order_id))
            }
            Self::SystemMessage(n) => (self.kind(), n.event_id.as_ref(), None),
            _ => return None,
        };

        if let Some(id) = event_id {
            return Some(format!("event:{id}"));
        }
        match (kind, order_id) {
            (Some(kind), Some(order_id)) => Some(format!("{kind}:{order_id}")),
            _ => None,
        }
    }
}

/// Messages the client sends over the socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping { timestamp: DateTime<Utc> },
}
