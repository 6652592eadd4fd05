//! Per-connection gateway session state.

use std::sync::Arc;

use super::registry::ConnectionRegistry;

/// An authenticated, registered connection.
///
/// Dropping the session removes it from the registry and from every group it
/// joined, however the session task exits.
pub struct GatewaySession {
    /// Authenticated username (from the bearer token).
    pub username: String,
    /// Registry-issued connection identifier (`conn_` prefixed ULID).
    pub conn_id: String,
    registry: Arc<ConnectionRegistry>,
}

impl GatewaySession {
    pub fn new(registry: Arc<ConnectionRegistry>, username: String, conn_id: String) -> Self {
        Self {
            username,
            conn_id,
            registry,
        }
    }
}

impl Drop for GatewaySession {
    fn drop(&mut self) {
        if self.registry.disconnect(&self.username, &self.conn_id) {
            tracing::debug!(username = %self.username, conn_id = %self.conn_id, "session deregistered");
        }
    }
}
