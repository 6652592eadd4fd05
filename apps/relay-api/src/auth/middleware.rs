//! Caller identity extraction for server-to-server push endpoints.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::AppState;

/// Header the persistence services use to assert who they are acting for.
pub const X_USERNAME: &str = "x-username";

/// Identity asserted by a trusted internal caller via `X-Username`.
#[derive(Debug, Clone)]
pub struct ServiceCaller {
    pub username: String,
}

impl FromRequestParts<AppState> for ServiceCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let username = parts
            .headers
            .get(X_USERNAME)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::unauthorized("No username provided"))?;

        Ok(ServiceCaller {
            username: username.to_string(),
        })
    }
}
