use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use teamwork_chat_core::transport::{
    OutgoingReply, PushConnection, PushConnector, PushEvent, PushHandler, ReconnectPolicy,
    SocketIoConnector,
};
use teamwork_chat_core::ConnectionState;

mod support;
use support::{wait_until, FakeChatServer};

const WAIT: Duration = Duration::from_secs(10);

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        max_attempts,
    }
}

fn client_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap()
}

fn recording_handler() -> (PushHandler, flume::Receiver<PushEvent>) {
    let (tx, rx) = flume::unbounded();
    let handler: PushHandler = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    (handler, rx)
}

fn states(events: &[PushEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            PushEvent::StateChanged(s) => Some(s.clone()),
            PushEvent::MessageReceived(_) => None,
        })
        .collect()
}

#[test]
fn handshake_delivers_messages_and_replies() {
    let server = FakeChatServer::start();
    let rt = client_runtime();
    let connector = SocketIoConnector::new(&server.socket_url, fast_policy(3)).unwrap();
    let (handler, rx) = recording_handler();

    let conn = connector.connect(rt.handle(), "tok", handler);
    wait_until("connected", WAIT, || conn.is_connected());
    assert_eq!(server.handshake_tokens(), vec!["tok".to_string()]);

    server.push_message(json!({"_id": "m1", "senderId": "u2", "content": "hey", "createdAt": 1709290000000i64}));
    let msg = loop {
        match rx.recv_timeout(WAIT).expect("push event") {
            PushEvent::MessageReceived(m) => break m,
            PushEvent::StateChanged(_) => continue,
        }
    };
    assert_eq!(msg.sender_id, "u2");
    assert_eq!(msg.content, "hey");
    assert_eq!(msg.created_at, Some(1709290000));

    conn.send(OutgoingReply {
        receiver_id: "u2".into(),
        content: "hi".into(),
        client_id: "c-1".into(),
    });
    wait_until("reply received", WAIT, || server.replies().len() == 1);
    assert_eq!(
        server.replies()[0],
        json!({"receiverId": "u2", "content": "hi", "clientId": "c-1"})
    );
}

#[test]
fn disconnect_is_idempotent_and_final() {
    let server = FakeChatServer::start();
    let rt = client_runtime();
    let connector = SocketIoConnector::new(&server.socket_url, fast_policy(3)).unwrap();
    let (handler, rx) = recording_handler();

    let conn = connector.connect(rt.handle(), "tok", handler);
    wait_until("connected", WAIT, || conn.is_connected());

    conn.disconnect();
    conn.disconnect();
    assert!(!conn.is_connected());
    wait_until("server saw close", WAIT, || server.connected_clients() == 0);

    std::thread::sleep(Duration::from_millis(300));
    let events: Vec<_> = rx.drain().collect();
    assert_eq!(
        states(&events),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
    assert_eq!(server.connections(), 1);

    // Dropped while disconnected.
    conn.send(OutgoingReply {
        receiver_id: "u2".into(),
        content: "late".into(),
        client_id: "c-2".into(),
    });
    std::thread::sleep(Duration::from_millis(100));
    assert!(server.replies().is_empty());
}

#[test]
fn auth_rejection_is_terminal() {
    let server = FakeChatServer::start();
    server.accept_only("good");
    let rt = client_runtime();
    let connector = SocketIoConnector::new(&server.socket_url, fast_policy(0)).unwrap();
    let (handler, rx) = recording_handler();

    let conn = connector.connect(rt.handle(), "bad", handler);
    let failed = loop {
        match rx.recv_timeout(WAIT).expect("state event") {
            PushEvent::StateChanged(ConnectionState::Failed { reason }) => break reason,
            _ => continue,
        }
    };
    assert!(failed.contains("invalid token"), "{failed}");

    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(server.connections(), 1);
    assert!(!conn.is_connected());
}

#[test]
fn lost_connection_reconnects_with_backoff() {
    let server = FakeChatServer::start();
    let rt = client_runtime();
    let connector = SocketIoConnector::new(&server.socket_url, fast_policy(5)).unwrap();
    let (handler, rx) = recording_handler();

    let conn = connector.connect(rt.handle(), "tok", handler);
    wait_until("connected", WAIT, || conn.is_connected());

    server.drop_connections();
    wait_until("second connection", WAIT, || {
        server.connections() == 2 && conn.is_connected()
    });
    std::thread::sleep(Duration::from_millis(100));

    let events: Vec<_> = rx.drain().collect();
    let seen = states(&events);
    assert!(seen.contains(&ConnectionState::Reconnecting { attempt: 1 }));
    assert_eq!(seen.last(), Some(&ConnectionState::Connected));
    conn.disconnect();
}

#[test]
fn unreachable_server_gives_up_after_max_attempts() {
    // Bind then drop to get a port nothing listens on.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let rt = client_runtime();
    let connector =
        SocketIoConnector::new(&format!("http://127.0.0.1:{port}"), fast_policy(2)).unwrap();
    let (handler, rx) = recording_handler();

    let _conn = connector.connect(rt.handle(), "tok", handler);
    let reason = loop {
        match rx.recv_timeout(WAIT).expect("state event") {
            PushEvent::StateChanged(ConnectionState::Failed { reason }) => break reason,
            _ => continue,
        }
    };
    assert!(reason.starts_with("gave up after 2 attempts"), "{reason}");
}
