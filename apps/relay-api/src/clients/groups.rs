//! Client for the group service, the source of truth for group membership.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chat_common::GroupId;
use serde::Deserialize;

use crate::auth::middleware::X_USERNAME;

/// Per-request deadline for group lookups.
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves the groups a user currently belongs to.
#[async_trait]
pub trait GroupResolver: Send + Sync {
    async fn groups_of(&self, username: &str) -> Result<Vec<GroupId>, GroupLookupError>;
}

#[derive(Debug)]
pub enum GroupLookupError {
    Transport(reqwest::Error),
    Status(reqwest::StatusCode),
    Decode(reqwest::Error),
}

impl fmt::Display for GroupLookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "group service unreachable: {e}"),
            Self::Status(s) => write!(f, "failed to get groups of user: {s}"),
            Self::Decode(e) => write!(f, "invalid group service response: {e}"),
        }
    }
}

impl std::error::Error for GroupLookupError {}

/// Group as returned by the group service (`is_direct` and `owner_name` are
/// ignored).
#[derive(Debug, Deserialize)]
struct GroupEntry {
    id: GroupId,
}

/// HTTP-backed resolver.
#[derive(Clone)]
pub struct HttpGroupResolver {
    base_url: String,
    http: reqwest::Client,
}

impl HttpGroupResolver {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GroupResolver for HttpGroupResolver {
    async fn groups_of(&self, username: &str) -> Result<Vec<GroupId>, GroupLookupError> {
        let url = format!("{}/api/group", self.base_url);

        let resp = self
            .http
            .get(&url)
            .query(&[("username", username)])
            .header(X_USERNAME, username)
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .map_err(GroupLookupError::Transport)?;

        if resp.status() != reqwest::StatusCode::OK {
            return Err(GroupLookupError::Status(resp.status()));
        }

        let groups: Vec<GroupEntry> = resp.json().await.map_err(GroupLookupError::Decode)?;
        Ok(groups.into_iter().map(|g| g.id).collect())
    }
}
