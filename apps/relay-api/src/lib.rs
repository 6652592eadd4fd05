pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod gateway;
pub mod routes;

use std::sync::Arc;

use auth::jwt::IdentityVerifier;
use clients::groups::GroupResolver;
use config::Config;
use gateway::fanout::Relay;
use gateway::registry::ConnectionRegistry;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub groups: Arc<dyn GroupResolver>,
    pub registry: Arc<ConnectionRegistry>,
    pub relay: Arc<Relay>,
}

impl AppState {
    /// Wire a fresh, empty registry and relay around the given collaborators.
    pub fn new(
        config: Config,
        verifier: Arc<dyn IdentityVerifier>,
        groups: Arc<dyn GroupResolver>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = Arc::new(Relay::new(registry.clone(), groups.clone()));
        Self {
            config: Arc::new(config),
            verifier,
            groups,
            registry,
            relay,
        }
    }
}
