use std::time::Duration;

use serde_json::json;
use teamwork_chat_core::api::{ApiError, ChatApi, HttpChatApi};

mod support;
use support::FakeChatServer;

fn client(server: &FakeChatServer, timeout: Duration) -> HttpChatApi {
    HttpChatApi::new(&server.api_url, "tok", timeout).unwrap()
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(f)
}

#[test]
fn list_peers_decodes_aliases_and_sends_bearer() {
    let server = FakeChatServer::start();
    server.route(
        "GET",
        "/api/messages/senders",
        200,
        json!({"data": [
            {"_id": 17, "fullName": "Ann", "profileImage": "https://cdn/a.png", "unreadMessages": 2},
            {"userId": "u2", "username": "bob"},
        ]}),
    );

    let peers = block_on(client(&server, Duration::from_secs(5)).list_peers()).unwrap();
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[0].id, "17");
    assert_eq!(peers[0].display_name, "Ann");
    assert_eq!(peers[0].avatar_url.as_deref(), Some("https://cdn/a.png"));
    assert_eq!(peers[0].unread_messages, 2);
    assert_eq!(peers[1].id, "u2");
    assert_eq!(peers[1].unread_messages, 0);

    let req = &server.requests()[0];
    assert_eq!(req.method, "GET");
    assert_eq!(req.authorization.as_deref(), Some("Bearer tok"));
}

#[test]
fn read_and_count_endpoints_hit_expected_paths() {
    let server = FakeChatServer::start();
    server.route("POST", "/api/messages/u1/read", 200, json!({"success": true}));
    server.route("GET", "/api/messages/unread/u1", 200, json!({"count": 4}));
    server.route("GET", "/api/messages/unread", 200, json!({"count": 9}));
    server.route("POST", "/api/messages/read-all", 200, json!({"success": false}));
    let api = client(&server, Duration::from_secs(5));

    assert!(block_on(api.mark_read("u1")).unwrap());
    assert_eq!(block_on(api.unread_count("u1")).unwrap(), 4);
    assert_eq!(block_on(api.total_unread_count()).unwrap(), 9);
    assert!(!block_on(api.mark_all_read()).unwrap());

    let paths: Vec<_> = server
        .requests()
        .into_iter()
        .map(|r| format!("{} {}", r.method, r.path))
        .collect();
    assert_eq!(
        paths,
        vec![
            "POST /api/messages/u1/read",
            "GET /api/messages/unread/u1",
            "GET /api/messages/unread",
            "POST /api/messages/read-all",
        ]
    );
}

#[test]
fn history_normalizes_timestamps() {
    let server = FakeChatServer::start();
    server.route(
        "GET",
        "/api/messages/u1",
        200,
        json!({"data": [
            {"_id": "a", "sender": {"_id": "u1", "name": "Ann"}, "content": "iso", "createdAt": "2024-03-01T10:00:00Z"},
            {"_id": "b", "senderId": "me", "content": "millis", "createdAt": 1709287260000i64},
        ]}),
    );

    let msgs = block_on(client(&server, Duration::from_secs(5)).message_history("u1")).unwrap();
    assert_eq!(msgs[0].sender_id, "u1");
    assert_eq!(msgs[0].created_at, Some(1709287200));
    assert_eq!(msgs[1].created_at, Some(1709287260));
}

#[test]
fn non_success_status_is_reported_with_body() {
    let server = FakeChatServer::start();
    server.route(
        "GET",
        "/api/messages/senders",
        401,
        json!({"message": "jwt expired"}),
    );

    let err = block_on(client(&server, Duration::from_secs(5)).list_peers()).unwrap_err();
    match err {
        ApiError::Status { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("jwt expired"), "{body}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn unknown_route_is_a_404_status() {
    let server = FakeChatServer::start();
    let err = block_on(client(&server, Duration::from_secs(5)).message_history("ghost")).unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 404, .. }));
}

#[test]
fn malformed_body_is_a_decode_error() {
    let server = FakeChatServer::start();
    server.route("GET", "/api/messages/unread", 200, json!({"count": "lots"}));
    let err = block_on(client(&server, Duration::from_secs(5)).total_unread_count()).unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)), "{err}");
}

#[test]
fn slow_server_times_out() {
    let server = FakeChatServer::start();
    server.route("GET", "/api/messages/senders", 200, json!({"data": []}));
    server.set_response_delay(Duration::from_secs(2));

    let err = block_on(client(&server, Duration::from_millis(200)).list_peers()).unwrap_err();
    assert!(err.is_timeout(), "{err}");
}
