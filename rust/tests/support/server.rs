use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::routing::{get, post};
use axum::{Extension, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

enum Push {
    Frame(String),
    Drop,
}

#[derive(Default)]
struct Shared {
    routes: Mutex<HashMap<String, (u16, String)>>,
    requests: Mutex<Vec<RecordedRequest>>,
    replies: Mutex<Vec<Value>>,
    handshake_tokens: Mutex<Vec<String>>,
    connections: AtomicUsize,
    accepted_token: Mutex<Option<String>>,
    response_delay_ms: AtomicU64,
    clients: Mutex<Vec<mpsc::UnboundedSender<Push>>>,
}

/// In-process stand-in for the chat backend: an axum REST router plus a
/// Socket.IO v4 WebSocket endpoint, each on its own port. Responses are
/// canned per `METHOD path` with [`FakeChatServer::route`].
#[allow(dead_code)]
pub struct FakeChatServer {
    pub api_url: String,
    pub socket_url: String,
    shared: Arc<Shared>,
    _runtime: tokio::runtime::Runtime,
}

#[allow(dead_code)]
impl FakeChatServer {
    pub fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("server runtime");
        let shared = Arc::new(Shared::default());

        let (api_addr, ws) = runtime.block_on(async {
            let router = Router::new()
                .route("/api/messages/senders", get(canned_response))
                .route("/api/messages/unread", get(canned_response))
                .route("/api/messages/unread/:peer_id", get(canned_response))
                .route("/api/messages/read-all", post(canned_response))
                .route("/api/messages/:peer_id", get(canned_response))
                .route("/api/messages/:peer_id/read", post(canned_response))
                .fallback(canned_response)
                .layer(Extension(shared.clone()));
            let http = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
                .serve(router.into_make_service());
            let api_addr = http.local_addr();
            tokio::spawn(async move {
                let _ = http.await;
            });
            (api_addr, TcpListener::bind("127.0.0.1:0").await.unwrap())
        });
        let api_url = format!("http://{api_addr}/api");
        let socket_url = format!("http://{}", ws.local_addr().unwrap());

        let s = shared.clone();
        runtime.spawn(async move {
            while let Ok((stream, _)) = ws.accept().await {
                tokio::spawn(serve_socket(stream, s.clone()));
            }
        });

        Self {
            api_url,
            socket_url,
            shared,
            _runtime: runtime,
        }
    }

    /// `path` is the full request path, e.g. `/api/messages/senders`.
    pub fn route(&self, method: &str, path: &str, status: u16, body: Value) {
        self.shared
            .routes
            .lock()
            .unwrap()
            .insert(format!("{method} {path}"), (status, body.to_string()));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.shared.requests.lock().unwrap().clone()
    }

    pub fn count_requests(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn set_response_delay(&self, delay: Duration) {
        self.shared
            .response_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Reject every socket handshake whose token differs from `token`.
    pub fn accept_only(&self, token: &str) {
        *self.shared.accepted_token.lock().unwrap() = Some(token.to_string());
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn handshake_tokens(&self) -> Vec<String> {
        self.shared.handshake_tokens.lock().unwrap().clone()
    }

    /// `reply` payloads emitted by clients, in arrival order.
    pub fn replies(&self) -> Vec<Value> {
        self.shared.replies.lock().unwrap().clone()
    }

    pub fn connected_clients(&self) -> usize {
        let mut clients = self.shared.clients.lock().unwrap();
        clients.retain(|c| !c.is_closed());
        clients.len()
    }

    /// Emit `message received` to every joined client. Returns how many got it.
    pub fn push_message(&self, payload: Value) -> usize {
        let frame = format!("42{}", json!(["message received", payload]));
        self.broadcast(|| Push::Frame(frame.clone()))
    }

    /// Server-side namespace disconnect (`41`).
    pub fn kick_all(&self) -> usize {
        self.broadcast(|| Push::Frame("41".to_string()))
    }

    /// Drop every socket without a close handshake, as a network loss would.
    pub fn drop_connections(&self) -> usize {
        self.broadcast(|| Push::Drop)
    }

    fn broadcast(&self, make: impl Fn() -> Push) -> usize {
        let mut clients = self.shared.clients.lock().unwrap();
        clients.retain(|c| c.send(make()).is_ok());
        clients.len()
    }
}

async fn canned_response(
    Extension(shared): Extension<Arc<Shared>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    let path = uri.path().to_string();
    let key = format!("{method} {path}");
    shared.requests.lock().unwrap().push(RecordedRequest {
        method: method.to_string(),
        path,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let delay = shared.response_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let route = shared.routes.lock().unwrap().get(&key).cloned();
    let (status, body) =
        route.unwrap_or_else(|| (404, json!({"message": "not found"}).to_string()));
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
}

async fn serve_socket(stream: TcpStream, shared: Arc<Shared>) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let n = shared.connections.fetch_add(1, Ordering::SeqCst) + 1;

    let open = json!({
        "sid": format!("sid-{n}"),
        "upgrades": [],
        "pingInterval": 25000,
        "pingTimeout": 20000,
    });
    if ws.send(Message::text(format!("0{open}"))).await.is_err() {
        return;
    }

    // Namespace connect carries the auth payload.
    let token = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Some(rest) = text.as_str().strip_prefix("40") {
                    let auth: Value = serde_json::from_str(rest).unwrap_or(Value::Null);
                    break auth
                        .get("token")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                }
            }
            Some(Ok(_)) => continue,
            _ => return,
        }
    };
    shared.handshake_tokens.lock().unwrap().push(token.clone());

    let accepted = shared.accepted_token.lock().unwrap().clone();
    if accepted.is_some_and(|t| t != token) {
        let _ = ws
            .send(Message::text(r#"44{"message":"invalid token"}"#))
            .await;
        let _ = ws.close(None).await;
        return;
    }
    if ws
        .send(Message::text(format!(r#"40{{"sid":"ns-{n}"}}"#)))
        .await
        .is_err()
    {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    shared.clients.lock().unwrap().push(tx);

    loop {
        tokio::select! {
            out = rx.recv() => match out {
                Some(Push::Frame(text)) => {
                    if ws.send(Message::text(text)).await.is_err() {
                        return;
                    }
                }
                Some(Push::Drop) | None => return,
            },
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(text))) => record_emit(&shared, text.as_str()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
        }
    }
}

fn record_emit(shared: &Shared, text: &str) {
    let Some(rest) = text.strip_prefix("42") else {
        return;
    };
    let Ok(Value::Array(items)) = serde_json::from_str::<Value>(rest) else {
        return;
    };
    if items.first().and_then(Value::as_str) == Some("reply") {
        if let Some(payload) = items.get(1) {
            shared.replies.lock().unwrap().push(payload.clone());
        }
    }
}
