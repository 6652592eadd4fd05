//! WebSocket upgrade handler and per-connection event loop.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::AppState;

use super::events::{AuthPayload, OutboundFrame};
use super::handler::{
    handle_auth, handle_client_frame, parse_auth_frame, Authenticated, HandshakeError,
};
use super::registry::CloseReason;
use super::session::GatewaySession;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Step 1: authenticate. Nothing is registered until this succeeds.
    let authenticated = match time::timeout(
        state.config.handshake_timeout,
        read_auth_frame(&mut ws_rx),
    )
    .await
    {
        Ok(Ok(payload)) => handle_auth(&state, payload).await,
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => Err(HandshakeError::Timeout),
    };

    let Authenticated { username, groups } = match authenticated {
        Ok(a) => a,
        Err(e) => {
            tracing::debug!(reason = e.reason(), "handshake failed");
            if e != HandshakeError::Closed {
                let _ = send_close(&mut ws_tx, e.close_code(), e.reason()).await;
            }
            return;
        }
    };

    // Step 2: register, evicting any older connection for this user.
    let group_count = groups.len();
    let handle = state
        .registry
        .connect(&username, groups, state.config.outbound_queue_capacity);
    let session = GatewaySession::new(state.registry.clone(), username, handle.conn_id);

    tracing::info!(
        username = %session.username,
        conn_id = %session.conn_id,
        groups = group_count,
        "gateway session established"
    );

    // Step 3: acknowledge before anything queued by the relay goes out.
    if ws_tx
        .send(OutboundFrame::auth_success().into_message())
        .await
        .is_err()
    {
        return;
    }

    run_session(
        &state,
        &session,
        &mut ws_tx,
        &mut ws_rx,
        handle.outbox,
        handle.closed,
    )
    .await;

    tracing::info!(
        username = %session.username,
        conn_id = %session.conn_id,
        "gateway session ended"
    );

    // Leave the index before the socket is released.
    drop(session);
    drop((ws_tx, ws_rx));
}

/// Wait for the first text frame and parse it as an `auth` envelope.
async fn read_auth_frame(ws_rx: &mut WsStream) -> Result<AuthPayload, HandshakeError> {
    while let Some(msg) = ws_rx.next().await {
        let msg = msg.map_err(|e| {
            tracing::debug!(?e, "ws read error during auth");
            HandshakeError::Read
        })?;

        match msg {
            Message::Text(text) => return parse_auth_frame(text.as_str()),
            Message::Binary(_) => return Err(HandshakeError::InvalidFrame),
            Message::Close(_) => return Err(HandshakeError::Closed),
            Message::Ping(_) | Message::Pong(_) => continue,
        }
    }
    Err(HandshakeError::Closed)
}

/// Main session event loop.
///
/// This task is the only writer of the socket: relay traffic arrives through
/// `outbox`, replies to the client's own frames are written inline.
async fn run_session(
    state: &AppState,
    session: &GatewaySession,
    ws_tx: &mut WsSink,
    ws_rx: &mut WsStream,
    mut outbox: mpsc::Receiver<OutboundFrame>,
    mut closed: oneshot::Receiver<CloseReason>,
) {
    loop {
        tokio::select! {
            biased;

            // The registry wants this connection gone.
            reason = &mut closed => {
                if let Ok(reason) = reason {
                    tracing::debug!(
                        username = %session.username,
                        conn_id = %session.conn_id,
                        ?reason,
                        "closing connection"
                    );
                    let _ = send_close(ws_tx, reason.code(), reason.as_str()).await;
                }
                break;
            }

            // Frame fanned out by the relay.
            frame = outbox.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(frame.into_message()).await.is_err() {
                    break;
                }
            }

            // Client sends us a message.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_frame(state, session, &text) {
                            if ws_tx.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::debug!(?e, username = %session.username, "ws read error");
                        break;
                    }
                }
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
