#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use chat_common::GroupId;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

use relay_api::auth::jwt::JwtVerifier;
use relay_api::clients::groups::{GroupLookupError, GroupResolver};
use relay_api::config::Config;
use relay_api::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TEST_SECRET: &str = "relay-test-secret";

/// In-memory group service that records how often it is asked.
#[derive(Default)]
pub struct StaticGroups {
    memberships: Mutex<HashMap<String, Vec<GroupId>>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl StaticGroups {
    pub fn set(&self, username: &str, groups: &[GroupId]) {
        self.memberships
            .lock()
            .insert(username.to_string(), groups.to_vec());
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GroupResolver for StaticGroups {
    async fn groups_of(&self, username: &str) -> Result<Vec<GroupId>, GroupLookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GroupLookupError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
        }
        Ok(self
            .memberships
            .lock()
            .get(username)
            .cloned()
            .unwrap_or_default())
    }
}

/// Everything a test needs to drive the relay.
pub struct Harness {
    pub state: AppState,
    pub groups: Arc<StaticGroups>,
    pub tokens: JwtVerifier,
}

impl Harness {
    /// Mint a bearer token for `username`.
    pub fn token(&self, username: &str) -> String {
        self.tokens.issue(username).expect("mint test token")
    }
}

pub fn test_config() -> Config {
    Config {
        jwt_secret: TEST_SECRET.to_string(),
        group_service_url: "http://groups.invalid".to_string(),
        port: 0,
        handshake_timeout: Duration::from_secs(2),
        outbound_queue_capacity: 16,
        cors_allowed_origin: None,
    }
}

/// Build a test AppState with a real token verifier and an in-memory group service.
pub fn test_harness() -> Harness {
    test_harness_with(test_config())
}

pub fn test_harness_with(config: Config) -> Harness {
    let groups = Arc::new(StaticGroups::default());
    let tokens = JwtVerifier::new(&config.jwt_secret);
    let state = AppState::new(config, Arc::new(tokens.clone()), groups.clone());
    Harness {
        state,
        groups,
        tokens,
    }
}

/// Build the full application router wired to a fresh harness.
pub fn test_app() -> (Router, Harness) {
    let harness = test_harness();
    let app = relay_api::routes::router().with_state(harness.state.clone());
    (app, harness)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the background.
pub async fn start_ws_server(harness: &Harness) -> SocketAddr {
    let app = relay_api::routes::router().with_state(harness.state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

pub async fn ws_connect(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/ws");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("send frame");
}

/// Read the next frame, failing the test after 5 seconds.
pub async fn next_frame(ws: &mut WsClient) -> tungstenite::Message {
    time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for frame")
        .expect("stream ended")
        .expect("ws read error")
}

/// Read the next text frame as JSON.
pub async fn next_json(ws: &mut WsClient) -> serde_json::Value {
    let msg = next_frame(ws).await;
    let text = msg.into_text().expect("not text");
    serde_json::from_str(&text).expect("parse frame")
}

/// Assert nothing arrives within `window`.
pub async fn assert_silent(ws: &mut WsClient, window: Duration) {
    if let Ok(Some(msg)) = time::timeout(window, ws.next()).await {
        panic!("expected no frame, got {msg:?}");
    }
}

/// Connect, authenticate, and wait for the auth acknowledgement.
pub async fn connect_and_auth(addr: SocketAddr, token: &str) -> WsClient {
    let mut ws = ws_connect(addr).await;
    send_json(
        &mut ws,
        serde_json::json!({ "type": "auth", "payload": { "token": token } }),
    )
    .await;

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["type"], "auth");
    assert_eq!(ack["payload"]["status"], "success");
    ws
}

/// Poll until `cond` holds, failing after 5 seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(time::Instant::now() < deadline, "condition not met in time");
        time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn chat_frame(username: &str, group_id: GroupId, content: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "chat",
        "payload": {
            "messageId": 1,
            "username": username,
            "groupId": group_id,
            "content": content,
            "createdAt": "2024-03-01T12:30:45.123456789Z",
        }
    })
}
