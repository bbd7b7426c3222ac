// Push channel: one authenticated connection per session.

mod backoff;
mod socket_io;
pub mod wire;

use std::sync::Arc;

pub use backoff::ReconnectPolicy;
pub use socket_io::{socket_endpoint, SocketIoConnector};

use crate::api::WireMessage;
use crate::state::ConnectionState;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("connection closed")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(#[from] wire::WireError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    MessageReceived(WireMessage),
    StateChanged(ConnectionState),
}

/// Payload of the outbound `reply` emit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingReply {
    pub receiver_id: String,
    pub content: String,
    /// Correlation id echoed back by servers that support it.
    pub client_id: String,
}

/// The single subscriber for everything a connection produces.
pub type PushHandler = Arc<dyn Fn(PushEvent) + Send + Sync + 'static>;

pub trait PushConnector: Send + Sync + 'static {
    /// Open one connection. Never blocks; progress and failures are reported
    /// through `handler` as `StateChanged` events.
    fn connect(
        &self,
        runtime: &tokio::runtime::Handle,
        auth_token: &str,
        handler: PushHandler,
    ) -> Box<dyn PushConnection>;
}

pub trait PushConnection: Send + Sync {
    /// Fire-and-forget. Dropped (with a warning) while not connected.
    fn send(&self, reply: OutgoingReply);

    /// Stop reconnecting and close the socket. Safe to call repeatedly.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
