pub mod health;
pub mod push;

use axum::Router;
use utoipa::OpenApi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .merge(push::router())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        push::push_message,
        push::push_notification,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            chat_common::ChatPayload,
            chat_common::NotificationPayload,
            health::HealthResponse,
            push::PushResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Relay", description = "Server-to-server live delivery"),
    )
)]
pub struct ApiDoc;
