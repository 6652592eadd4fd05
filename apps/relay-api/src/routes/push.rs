//! Server-to-server push endpoints used by the persistence services.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chat_common::{ChatPayload, NotificationPayload};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::middleware::ServiceCaller;
use crate::error::{ApiError, ApiErrorBody};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/message", post(push_message))
        .route("/ws/noti", post(push_notification))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PushResponse {
    pub delivered: bool,
}

// ---------------------------------------------------------------------------
// POST /ws/message
// ---------------------------------------------------------------------------

/// Fan a stored chat message out to the group's live members.
///
/// The sender is taken from `X-Username`, not from the body.
#[utoipa::path(
    post,
    path = "/ws/message",
    tag = "Relay",
    request_body = ChatPayload,
    params(("X-Username" = String, Header, description = "Sender of the message")),
    responses(
        (status = 200, description = "Delivered to the group", body = PushResponse),
        (status = 400, description = "Invalid request body", body = ApiErrorBody),
        (status = 401, description = "Missing X-Username", body = ApiErrorBody),
        (status = 404, description = "Group not found or sender not in any known group", body = ApiErrorBody),
    ),
)]
pub async fn push_message(
    ServiceCaller { username }: ServiceCaller,
    State(state): State<AppState>,
    body: Result<Json<ChatPayload>, JsonRejection>,
) -> Result<Json<PushResponse>, ApiError> {
    let Json(mut chat) = body?;
    chat.username = username;

    state.relay.push_chat(&chat).await?;

    Ok(Json(PushResponse { delivered: true }))
}

// ---------------------------------------------------------------------------
// POST /ws/noti
// ---------------------------------------------------------------------------

/// Push a stored notification to its recipient, if they are connected.
#[utoipa::path(
    post,
    path = "/ws/noti",
    tag = "Relay",
    request_body = NotificationPayload,
    params(("X-Username" = String, Header, description = "Calling service identity")),
    responses(
        (status = 200, description = "Delivered to the recipient", body = PushResponse),
        (status = 400, description = "Invalid request body", body = ApiErrorBody),
        (status = 401, description = "Missing X-Username", body = ApiErrorBody),
        (status = 404, description = "Recipient not connected", body = ApiErrorBody),
    ),
)]
pub async fn push_notification(
    caller: ServiceCaller,
    State(state): State<AppState>,
    body: Result<Json<NotificationPayload>, JsonRejection>,
) -> Result<Json<PushResponse>, ApiError> {
    let Json(notification) = body?;
    tracing::debug!(
        caller = %caller.username,
        recipient = %notification.username,
        "notification push"
    );

    state.relay.push_notification(&notification)?;

    Ok(Json(PushResponse { delivered: true }))
}
