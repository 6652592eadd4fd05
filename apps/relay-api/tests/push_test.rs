mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use chat_common::GroupId;
use http::{HeaderName, HeaderValue};

const X_USERNAME: HeaderName = HeaderName::from_static("x-username");

fn chat_body(group_id: i64) -> serde_json::Value {
    serde_json::json!({
        "messageId": 42,
        "username": "whoever",
        "groupId": group_id,
        "content": "hello",
        "createdAt": "2024-03-01T12:30:45.123Z",
    })
}

fn notification_body(recipient: &str) -> serde_json::Value {
    serde_json::json!({
        "id": 3,
        "username": recipient,
        "icon": "heart",
        "desc": "alice liked your post",
        "link": "/post/7",
        "read": false,
        "createdAt": "2024-03-01T12:30:45Z",
    })
}

// ---------------------------------------------------------------------------
// POST /ws/message
// ---------------------------------------------------------------------------

#[tokio::test]
async fn push_message_requires_caller_header() {
    let (app, _harness) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.post("/ws/message").json(&chat_body(5)).await;

    resp.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn push_message_rejects_malformed_body() {
    let (app, _harness) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/ws/message")
        .add_header(X_USERNAME, HeaderValue::from_static("alice"))
        .json(&serde_json::json!({ "content": "missing fields" }))
        .await;

    resp.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn push_message_delivers_to_group_with_header_sender() {
    let (app, harness) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let registry = &harness.state.registry;
    let mut alice = registry.connect("alice", [5], 8);
    let mut bob = registry.connect("bob", [5], 8);

    let resp = server
        .post("/ws/message")
        .add_header(X_USERNAME, HeaderValue::from_static("alice"))
        .json(&chat_body(5))
        .await;

    resp.assert_status_ok();
    assert_eq!(resp.json::<serde_json::Value>()["delivered"], true);

    let frame = bob.outbox.try_recv().expect("bob got the chat");
    let chat: serde_json::Value = serde_json::from_str(frame.as_str()).unwrap();
    assert_eq!(chat["type"], "chat");
    assert_eq!(chat["payload"]["username"], "alice");
    assert_eq!(chat["payload"]["messageId"], 42);
    assert!(alice.outbox.try_recv().is_err());
    assert_eq!(harness.groups.calls(), 0);
}

#[tokio::test]
async fn push_message_refreshes_membership_once_on_miss() {
    let (app, harness) = common::test_app();
    let server = TestServer::new(app).unwrap();

    // Alice joined group 9 after connecting; only the group service knows.
    harness.groups.set("alice", &[5, 9]);
    let _alice = harness.state.registry.connect("alice", [5], 8);

    let resp = server
        .post("/ws/message")
        .add_header(X_USERNAME, HeaderValue::from_static("alice"))
        .json(&chat_body(9))
        .await;

    resp.assert_status_ok();
    assert_eq!(harness.groups.calls(), 1);
    assert_eq!(harness.state.registry.group_members(9), vec!["alice"]);
}

#[tokio::test]
async fn push_message_to_unknown_group_is_not_found_after_one_refresh() {
    let (app, harness) = common::test_app();
    let server = TestServer::new(app).unwrap();

    harness.groups.set("alice", &[5]);
    let _alice = harness.state.registry.connect("alice", [5], 8);

    let resp = server
        .post("/ws/message")
        .add_header(X_USERNAME, HeaderValue::from_static("alice"))
        .json(&chat_body(404))
        .await;

    resp.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(harness.groups.calls(), 1);
}

#[tokio::test]
async fn push_message_survives_group_service_outage() {
    let (app, harness) = common::test_app();
    let server = TestServer::new(app).unwrap();

    harness.groups.fail(true);
    let _alice = harness.state.registry.connect("alice", [5], 8);

    let resp = server
        .post("/ws/message")
        .add_header(X_USERNAME, HeaderValue::from_static("alice"))
        .json(&chat_body(9))
        .await;

    resp.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(harness.groups.calls(), 1);
    assert!(harness.state.registry.is_connected("alice"));
}

// ---------------------------------------------------------------------------
// POST /ws/noti
// ---------------------------------------------------------------------------

#[tokio::test]
async fn push_notification_reaches_connected_recipient() {
    let (app, harness) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let mut bob = harness.state.registry.connect("bob", Vec::<GroupId>::new(), 8);

    let resp = server
        .post("/ws/noti")
        .add_header(X_USERNAME, HeaderValue::from_static("system"))
        .json(&notification_body("bob"))
        .await;

    resp.assert_status_ok();
    let frame = bob.outbox.try_recv().expect("bob got the notification");
    let noti: serde_json::Value = serde_json::from_str(frame.as_str()).unwrap();
    assert_eq!(noti["type"], "notification");
    assert_eq!(noti["payload"]["desc"], "alice liked your post");
    assert_eq!(noti["payload"]["createdAt"], "2024-03-01T12:30:45Z");
}

#[tokio::test]
async fn push_notification_to_offline_user_is_not_found() {
    let (app, _harness) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server
        .post("/ws/noti")
        .add_header(X_USERNAME, HeaderValue::from_static("system"))
        .json(&notification_body("carol"))
        .await;

    resp.assert_status(StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"]["message"], "User not connected");
}

#[tokio::test]
async fn push_notification_requires_caller_header() {
    let (app, _harness) = common::test_app();
    let server = TestServer::new(app).unwrap();

    let resp = server.post("/ws/noti").json(&notification_body("bob")).await;

    resp.assert_status(StatusCode::UNAUTHORIZED);
}
