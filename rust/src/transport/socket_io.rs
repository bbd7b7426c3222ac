use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use reqwest::Url;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use super::wire::{self, Frame};
use super::{
    OutgoingReply, PushConnection, PushConnector, PushEvent, PushHandler, ReconnectPolicy,
    TransportError,
};
use crate::api::WireMessage;
use crate::state::ConnectionState;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Rewrite an `http(s)`/`ws(s)` base into the Engine.IO WebSocket endpoint.
pub fn socket_endpoint(base: &str) -> Result<String, TransportError> {
    let mut url =
        Url::parse(base.trim()).map_err(|e| TransportError::InvalidUrl(format!("{base}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(TransportError::InvalidUrl(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidUrl(base.to_string()))?;

    let has_socket_path = url
        .path_segments()
        .map(|segs| segs.filter(|s| !s.is_empty()).last() == Some("socket.io"))
        .unwrap_or(false);
    {
        let mut segs = url
            .path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(base.to_string()))?;
        segs.pop_if_empty();
        if !has_socket_path {
            segs.push("socket.io");
        }
        segs.push("");
    }
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url.to_string())
}

#[derive(Debug, Clone)]
pub struct SocketIoConnector {
    endpoint: String,
    policy: ReconnectPolicy,
    handshake_timeout: Duration,
}

impl SocketIoConnector {
    pub fn new(socket_url: &str, policy: ReconnectPolicy) -> Result<Self, TransportError> {
        Ok(Self {
            endpoint: socket_endpoint(socket_url)?,
            policy,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PushConnector for SocketIoConnector {
    fn connect(
        &self,
        runtime: &tokio::runtime::Handle,
        auth_token: &str,
        handler: PushHandler,
    ) -> Box<dyn PushConnection> {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let connected = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            endpoint: self.endpoint.clone(),
            auth_token: auth_token.to_string(),
            policy: self.policy.clone(),
            handshake_timeout: self.handshake_timeout,
            handler,
            out_rx,
            shutdown: shutdown_rx,
            connected: connected.clone(),
        };
        runtime.spawn(worker.run());

        Box::new(SocketIoConnection {
            out_tx,
            shutdown: shutdown_tx,
            connected,
        })
    }
}

struct SocketIoConnection {
    out_tx: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
    connected: Arc<AtomicBool>,
}

impl PushConnection for SocketIoConnection {
    fn send(&self, reply: OutgoingReply) {
        if !self.connected.load(Ordering::SeqCst) {
            tracing::warn!(receiver = %reply.receiver_id, "push: reply dropped (not connected)");
            return;
        }
        let data = match serde_json::to_value(&reply) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(%e, "push: reply encode failed");
                return;
            }
        };
        let _ = self.out_tx.send(wire::encode_event(wire::EVENT_REPLY, data));
    }

    fn disconnect(&self) {
        // `send_replace` succeeds even when the worker is already gone.
        self.shutdown.send_replace(true);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SocketIoConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

enum SessionEnd {
    Shutdown,
    Rejected(String),
    Kicked,
    Lost {
        was_connected: bool,
        error: TransportError,
    },
}

struct Worker {
    endpoint: String,
    auth_token: String,
    policy: ReconnectPolicy,
    handshake_timeout: Duration,
    handler: PushHandler,
    out_rx: mpsc::UnboundedReceiver<String>,
    shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
}

impl Worker {
    fn emit_state(&self, state: ConnectionState) {
        (self.handler)(PushEvent::StateChanged(state));
    }

    async fn run(mut self) {
        let mut rng = StdRng::from_entropy();
        let mut attempt: u32 = 0;
        self.emit_state(ConnectionState::Connecting);

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let end = self.session().await;
            self.connected.store(false, Ordering::SeqCst);

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Rejected(reason) => {
                    tracing::warn!(%reason, "push: connection rejected");
                    self.emit_state(ConnectionState::Failed { reason });
                    return;
                }
                SessionEnd::Kicked => {
                    tracing::info!("push: server closed the session");
                    self.emit_state(ConnectionState::Failed {
                        reason: "disconnected by server".into(),
                    });
                    return;
                }
                SessionEnd::Lost {
                    was_connected,
                    error,
                } => {
                    if was_connected {
                        attempt = 0;
                    }
                    attempt += 1;
                    let Some(delay) = self.policy.delay(attempt, &mut rng) else {
                        tracing::warn!(attempt, %error, "push: giving up");
                        self.emit_state(ConnectionState::Failed {
                            reason: format!("gave up after {} attempts: {error}", attempt - 1),
                        });
                        return;
                    };
                    tracing::info!(attempt, ?delay, %error, "push: connection lost, retrying");
                    self.emit_state(ConnectionState::Reconnecting { attempt });
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
            }
        }

        self.emit_state(ConnectionState::Disconnected);
    }

    async fn session(&mut self) -> SessionEnd {
        let connect = tokio_tungstenite::connect_async(self.endpoint.as_str());
        let ws = tokio::select! {
            res = tokio::time::timeout(self.handshake_timeout, connect) => match res {
                Ok(Ok((ws, _))) => ws,
                Ok(Err(e)) => return SessionEnd::Lost { was_connected: false, error: e.into() },
                Err(_) => return SessionEnd::Lost {
                    was_connected: false,
                    error: TransportError::Timeout("websocket connect"),
                },
            },
            _ = self.shutdown.changed() => return SessionEnd::Shutdown,
        };
        let (mut sink, mut stream) = ws.split();

        // Until the open packet arrives, the handshake timeout bounds each read.
        let mut liveness = self.handshake_timeout;
        let mut joined = false;

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        let _ = sink.send(Message::text(wire::EnginePacket::Close.encode())).await;
                        let _ = sink.close().await;
                        return SessionEnd::Shutdown;
                    }
                }
                out = self.out_rx.recv(), if joined => {
                    let Some(text) = out else {
                        return SessionEnd::Shutdown;
                    };
                    if let Err(e) = sink.send(Message::text(text)).await {
                        return SessionEnd::Lost { was_connected: true, error: e.into() };
                    }
                }
                next = tokio::time::timeout(liveness, stream.next()) => {
                    let msg = match next {
                        Err(_) => {
                            return SessionEnd::Lost {
                                was_connected: joined,
                                error: TransportError::Timeout("heartbeat"),
                            }
                        }
                        Ok(None) => {
                            return SessionEnd::Lost { was_connected: joined, error: TransportError::Closed }
                        }
                        Ok(Some(Err(e))) => {
                            return SessionEnd::Lost { was_connected: joined, error: e.into() }
                        }
                        Ok(Some(Ok(m))) => m,
                    };
                    let text = match msg {
                        Message::Text(text) => text,
                        Message::Close(_) => {
                            return SessionEnd::Lost { was_connected: joined, error: TransportError::Closed }
                        }
                        _ => continue,
                    };

                    let frame = match wire::decode_frame(text.as_str()) {
                        Ok(f) => f,
                        Err(e) => {
                            tracing::warn!(%e, "push: undecodable frame");
                            continue;
                        }
                    };
                    let reply = match frame {
                        Frame::Open(info) => {
                            liveness = Duration::from_millis(info.ping_interval + info.ping_timeout);
                            tracing::debug!(sid = %info.sid, ?liveness, "push: engine open");
                            Some(wire::encode_connect(&self.auth_token))
                        }
                        Frame::Ping(data) => Some(wire::encode_pong(&data)),
                        Frame::Connected => {
                            joined = true;
                            // Anything queued before this connection existed is stale.
                            while self.out_rx.try_recv().is_ok() {}
                            self.connected.store(true, Ordering::SeqCst);
                            self.emit_state(ConnectionState::Connected);
                            None
                        }
                        Frame::ConnectError(reason) => return SessionEnd::Rejected(reason),
                        Frame::Disconnected => return SessionEnd::Kicked,
                        Frame::Close => {
                            return SessionEnd::Lost { was_connected: joined, error: TransportError::Closed }
                        }
                        Frame::Event { name, data } => {
                            self.handle_event(&name, data);
                            None
                        }
                        Frame::Pong | Frame::Noop => None,
                    };
                    if let Some(reply) = reply {
                        if let Err(e) = sink.send(Message::text(reply)).await {
                            return SessionEnd::Lost { was_connected: joined, error: e.into() };
                        }
                    }
                }
            }
        }
    }

    fn handle_event(&self, name: &str, data: serde_json::Value) {
        if name != wire::EVENT_MESSAGE_RECEIVED {
            tracing::debug!(event = name, "push: ignoring event");
            return;
        }
        match serde_json::from_value::<WireMessage>(data) {
            Ok(msg) => (self.handler)(PushEvent::MessageReceived(msg)),
            Err(e) => tracing::warn!(%e, "push: malformed message payload"),
        }
    }
}
