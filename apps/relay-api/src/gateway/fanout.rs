//! Chat and notification fan-out to live connections.
//!
//! Delivery is best-effort: every message reaching this module has already
//! been stored by the service that pushed it, so a miss only means the
//! recipient did not see it live and will pick it up from history.

use std::fmt;
use std::sync::Arc;

use chat_common::{ChatPayload, GroupId, NotificationPayload};

use crate::clients::groups::GroupResolver;

use super::events::OutboundFrame;
use super::registry::ConnectionRegistry;

/// Live delivery could not reach anyone it was meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMiss {
    /// The target group is unknown even after a membership refresh.
    GroupNotFound,
    /// The notification recipient has no live connection.
    RecipientOffline,
}

impl fmt::Display for DeliveryMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GroupNotFound => f.write_str("Group not found or user not in group"),
            Self::RecipientOffline => f.write_str("User not connected"),
        }
    }
}

impl std::error::Error for DeliveryMiss {}

/// The fan-out hub. Cloneable handles live in `AppState`.
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    groups: Arc<dyn GroupResolver>,
}

impl Relay {
    pub fn new(registry: Arc<ConnectionRegistry>, groups: Arc<dyn GroupResolver>) -> Self {
        Self { registry, groups }
    }

    /// Push `frame` to every connected member of `group_id` except `exclude`.
    /// Returns whether the group was known.
    pub fn broadcast_to_group(&self, group_id: GroupId, frame: &OutboundFrame, exclude: &str) -> bool {
        self.registry.broadcast_to_group(group_id, frame, exclude)
    }

    /// Fire-and-forget broadcast of a chat message sent over a live socket.
    ///
    /// `frame` is what members receive; `chat` is its decoded form. Senders
    /// may only post to groups they are cached as members of.
    pub fn broadcast_chat(&self, chat: &ChatPayload, frame: &OutboundFrame) {
        if !self.registry.is_member(&chat.username, chat.group_id) {
            tracing::debug!(
                sender = %chat.username,
                group_id = chat.group_id,
                "chat dropped, sender not in group"
            );
            return;
        }
        self.broadcast_to_group(chat.group_id, frame, &chat.username);
    }

    /// Broadcast a chat message stored by the message service.
    ///
    /// If the group is not in the index, the sender's memberships are
    /// refreshed from the group service and the broadcast is retried once.
    pub async fn push_chat(&self, chat: &ChatPayload) -> Result<(), DeliveryMiss> {
        let frame = OutboundFrame::chat(chat);
        if self.broadcast_to_group(chat.group_id, &frame, &chat.username) {
            return Ok(());
        }

        self.refresh_groups(&chat.username).await;

        if self.broadcast_to_group(chat.group_id, &frame, &chat.username) {
            Ok(())
        } else {
            Err(DeliveryMiss::GroupNotFound)
        }
    }

    /// Push a stored notification to its recipient's live connection.
    pub fn push_notification(&self, notification: &NotificationPayload) -> Result<(), DeliveryMiss> {
        let frame = OutboundFrame::notification(notification);
        if self.registry.send_to(&notification.username, &frame) {
            Ok(())
        } else {
            Err(DeliveryMiss::RecipientOffline)
        }
    }

    async fn refresh_groups(&self, username: &str) {
        match self.groups.groups_of(username).await {
            Ok(groups) => {
                let count = groups.len();
                if self.registry.merge_groups(username, groups) {
                    tracing::debug!(%username, groups = count, "group memberships refreshed");
                } else {
                    tracing::debug!(%username, "refresh skipped, user not connected");
                }
            }
            Err(e) => {
                tracing::warn!(%username, error = %e, "group refresh failed");
            }
        }
    }
}
