//! Envelope discriminators, close codes, and the wire codec.

use axum::extract::ws::{Message, Utf8Bytes};
use chat_common::{ChatPayload, NotificationPayload};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

// ---------------------------------------------------------------------------
// Discriminators
// ---------------------------------------------------------------------------

pub const TYPE_AUTH: &str = "auth";
pub const TYPE_CHAT: &str = "chat";
pub const TYPE_NOTIFICATION: &str = "notification";

// ---------------------------------------------------------------------------
// Close codes (4000-range for application-level)
// ---------------------------------------------------------------------------

pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_NOT_AUTHENTICATED: u16 = 4003;
pub const CLOSE_AUTH_FAILED: u16 = 4004;
pub const CLOSE_REPLACED: u16 = 4008;
pub const CLOSE_SESSION_TIMEOUT: u16 = 4009;
pub const CLOSE_SLOW_CONSUMER: u16 = 4010;

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// First decoding phase: the discriminator plus the untouched payload span.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Box<RawValue>,
}

/// Second decoding phase: the payload decoded according to its discriminator.
#[derive(Debug)]
pub enum Frame {
    Auth(AuthPayload),
    Chat(ChatPayload),
    Notification(NotificationPayload),
    /// Discriminator this relay does not know. Left to the caller to handle.
    Unknown(String),
}

impl Envelope {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Decode the retained payload as `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(self.payload.get())
    }

    pub fn into_frame(self) -> Result<Frame, serde_json::Error> {
        let frame = match self.kind.as_str() {
            TYPE_AUTH => Frame::Auth(self.payload_as()?),
            TYPE_CHAT => Frame::Chat(self.payload_as()?),
            TYPE_NOTIFICATION => Frame::Notification(self.payload_as()?),
            _ => Frame::Unknown(self.kind),
        };
        Ok(frame)
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthPayload {
    pub token: String,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OutboundEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: &'a T,
}

/// An envelope serialized once and shared verbatim by every recipient.
///
/// Cloning is cheap: the text is reference-counted.
#[derive(Debug, Clone)]
pub struct OutboundFrame(Utf8Bytes);

impl OutboundFrame {
    const AUTH_SUCCESS: &'static str = r#"{"type":"auth","payload":{"status":"success"}}"#;

    fn encode<T: Serialize>(kind: &str, payload: &T) -> Self {
        // Payloads are plain structs with string keys, so serialization can't fail.
        let json = serde_json::to_string(&OutboundEnvelope { kind, payload })
            .expect("envelope serialization");
        Self(json.into())
    }

    /// Handshake acknowledgement.
    pub fn auth_success() -> Self {
        Self(Utf8Bytes::from_static(Self::AUTH_SUCCESS))
    }

    pub fn chat(payload: &ChatPayload) -> Self {
        Self::encode(TYPE_CHAT, payload)
    }

    pub fn notification(payload: &NotificationPayload) -> Self {
        Self::encode(TYPE_NOTIFICATION, payload)
    }

    /// Forward a frame exactly as a client sent it.
    pub fn relayed(text: Utf8Bytes) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn into_message(self) -> Message {
        Message::Text(self.0)
    }
}
