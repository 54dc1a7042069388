//! Socket transport seam.
//!
//! The channel logic drives a [`SocketLink`] obtained from a
//! [`SocketConnector`]; production uses tokio-tungstenite, tests script the
//! link lifecycle without a network.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Transport-level WebSocket failure. Logged and surfaced to error
/// observers; never fatal to the app.
#[derive(Debug, Clone, Error)]
pub enum SocketError {
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("websocket transport error: {0}")]
    Transport(String),
}

/// Inbound events a link produces.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Text(String),
    /// The server sent a close frame.
    Closed { code: Option<u16>, reason: String },
}

/// One live socket connection.
#[async_trait]
pub trait SocketLink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), SocketError>;

    /// The next inbound event; `None` once the stream is exhausted.
    async fn next_event(&mut self) -> Option<Result<SocketEvent, SocketError>>;

    /// Closes the connection. Best effort; errors are discarded.
    async fn close(&mut self);
}

/// Opens socket connections.
#[async_trait]
pub trait SocketConnector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn SocketLink>, SocketError>;
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn SocketLink>, SocketError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| SocketError::Connect(e.to_string()))?;
        Ok(Box::new(TungsteniteLink { stream }))
    }
}

struct TungsteniteLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SocketLink for TungsteniteLink {
    async fn send_text(&mut self, text: String) -> Result<(), SocketError> {
        self.stream
            .send(Message::text(text))
            .await
            .map_err(|e| SocketError::Transport(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<Result<SocketEvent, SocketError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(Ok(SocketEvent::Text(text.to_string())));
                }
                Ok(Message::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                        .unwrap_or((None, String::new()));
                    return Some(Ok(SocketEvent::Closed { code, reason }));
                }
                // Ping/pong frames are answered by the protocol stack and
                // binary frames are not part of the notification protocol.
                Ok(_) => continue,
                Err(e) => return Some(Err(SocketError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
