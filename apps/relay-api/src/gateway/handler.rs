//! Handshake and inbound frame dispatch.

use axum::extract::ws::Utf8Bytes;
use chat_common::GroupId;

use crate::AppState;

use super::events::{
    AuthPayload, Envelope, Frame, OutboundFrame, CLOSE_AUTH_FAILED, CLOSE_NOT_AUTHENTICATED,
    CLOSE_SESSION_TIMEOUT, TYPE_AUTH,
};
use super::session::GatewaySession;

/// Why a connection never got past its first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeError {
    Timeout,
    /// Client closed (or the stream ended) before authenticating.
    Closed,
    Read,
    InvalidFrame,
    /// First frame was something other than `auth`.
    NotAuth,
    InvalidToken,
    GroupLookup,
}

impl HandshakeError {
    pub fn close_code(self) -> u16 {
        match self {
            Self::Timeout => CLOSE_SESSION_TIMEOUT,
            Self::Closed | Self::Read | Self::InvalidFrame | Self::NotAuth => {
                CLOSE_NOT_AUTHENTICATED
            }
            Self::InvalidToken | Self::GroupLookup => CLOSE_AUTH_FAILED,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Timeout => "Handshake timeout",
            Self::Closed => "Connection closed before auth",
            Self::Read => "Read error",
            Self::InvalidFrame => "Invalid JSON",
            Self::NotAuth => "First message must be auth",
            Self::InvalidToken => "Invalid token",
            Self::GroupLookup => "Failed to load groups",
        }
    }
}

/// A successfully authenticated user, ready to be registered.
#[derive(Debug)]
pub struct Authenticated {
    pub username: String,
    pub groups: Vec<GroupId>,
}

/// Parse the handshake frame. Anything but a well-formed `auth` envelope fails.
pub fn parse_auth_frame(text: &str) -> Result<AuthPayload, HandshakeError> {
    let envelope = Envelope::decode(text).map_err(|_| HandshakeError::InvalidFrame)?;
    if !envelope.is(TYPE_AUTH) {
        return Err(HandshakeError::NotAuth);
    }
    envelope
        .payload_as()
        .map_err(|_| HandshakeError::InvalidFrame)
}

/// Verify the bearer token, then load the user's groups.
pub async fn handle_auth(
    state: &AppState,
    payload: AuthPayload,
) -> Result<Authenticated, HandshakeError> {
    let username = state.verifier.verify(&payload.token).await.map_err(|e| {
        tracing::debug!(error = %e, "token rejected");
        HandshakeError::InvalidToken
    })?;

    let groups = state.groups.groups_of(&username).await.map_err(|e| {
        tracing::debug!(%username, error = %e, "group lookup failed during handshake");
        HandshakeError::GroupLookup
    })?;

    Ok(Authenticated { username, groups })
}

/// Dispatch one text frame from an authenticated client.
///
/// Returns a frame to write back to the same socket, if any. Undecodable
/// frames are skipped; they never end the session.
pub fn handle_client_frame(
    state: &AppState,
    session: &GatewaySession,
    text: &Utf8Bytes,
) -> Option<Utf8Bytes> {
    let envelope = match Envelope::decode(text.as_str()) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(username = %session.username, error = %e, "skipping undecodable frame");
            return None;
        }
    };

    match envelope.into_frame() {
        Ok(Frame::Auth(_)) => {
            tracing::debug!(username = %session.username, "ignoring repeated auth");
            None
        }
        Ok(Frame::Chat(mut chat)) => {
            // Forward the client's bytes as-is unless the sender must be rewritten.
            let frame = if chat.username == session.username {
                OutboundFrame::relayed(text.clone())
            } else {
                tracing::debug!(
                    username = %session.username,
                    claimed = %chat.username,
                    "overriding claimed chat sender"
                );
                chat.username = session.username.clone();
                OutboundFrame::chat(&chat)
            };
            state.relay.broadcast_chat(&chat, &frame);
            None
        }
        Ok(Frame::Notification(notification)) => {
            tracing::debug!(
                username = %session.username,
                desc = %notification.desc,
                "echoing client notification"
            );
            Some(text.clone())
        }
        Ok(Frame::Unknown(kind)) => {
            tracing::debug!(username = %session.username, %kind, "unknown message type");
            None
        }
        Err(e) => {
            tracing::debug!(username = %session.username, error = %e, "invalid payload");
            None
        }
    }
}
