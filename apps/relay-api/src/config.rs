use std::time::Duration;

/// Default bound on each connection's outbound queue.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 128;

/// Upper bound accepted for `OUTBOUND_QUEUE_CAPACITY`.
const MAX_OUTBOUND_QUEUE_CAPACITY: usize = 4096;

/// Relay API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HMAC secret shared with the auth service for bearer token verification.
    pub jwt_secret: String,
    /// The group service origin (e.g. `http://message:8080`).
    pub group_service_url: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// How long a new socket may take to send its `auth` frame.
    pub handshake_timeout: Duration,
    /// Frames buffered per connection before it is treated as a slow consumer.
    pub outbound_queue_capacity: usize,
    /// Single browser origin allowed by CORS. `None` allows any origin.
    pub cors_allowed_origin: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            jwt_secret: required_var("JWT_SECRET"),
            group_service_url: required_var("GROUP_SERVICE_URL"),
            port: parsed_var("PORT").unwrap_or(8080),
            handshake_timeout: Duration::from_secs(
                parsed_var("HANDSHAKE_TIMEOUT_SECS").unwrap_or(10),
            ),
            outbound_queue_capacity: parsed_var("OUTBOUND_QUEUE_CAPACITY")
                .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAPACITY)
                .clamp(1, MAX_OUTBOUND_QUEUE_CAPACITY),
            cors_allowed_origin: std::env::var("CORS_ALLOWED_ORIGIN")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
