//! Payload shapes shared between the relay and the services that push into it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Group identifiers as issued by the group service.
pub type GroupId = i64;

/// A chat message addressed to every member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub message_id: i64,
    pub username: String,
    #[schema(value_type = i64)]
    pub group_id: GroupId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A notification addressed to a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationPayload {
    pub id: i64,
    /// Recipient.
    pub username: String,
    pub icon: String,
    pub desc: String,
    pub link: String,
    pub read: bool,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: DateTime<Utc>,
}
