//! Bearer token verification for WebSocket handshakes.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Resolves an opaque bearer token to a user identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, VerifyError>;
}

#[derive(Debug)]
pub enum VerifyError {
    /// Signature, algorithm or expiry check failed.
    Invalid(jsonwebtoken::errors::Error),
    /// The token carried no usable username claim.
    MissingIdentity,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(e) => write!(f, "invalid token: {e}"),
            Self::MissingIdentity => f.write_str("token has no username"),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Claims issued by the auth service. `exp` is optional there, so it is only
/// checked when present.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// HS256 verifier sharing its secret with the auth service.
#[derive(Clone)]
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Mint a token for `username` with the shared secret.
    pub fn issue(&self, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_claims(&TokenClaims {
            username: username.to_string(),
            exp: None,
        })
    }

    pub fn issue_claims(&self, claims: &TokenClaims) -> Result<String, jsonwebtoken::errors::Error> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<String, VerifyError> {
        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &self.validation)
            .map_err(VerifyError::Invalid)?;

        if data.claims.username.is_empty() {
            return Err(VerifyError::MissingIdentity);
        }
        Ok(data.claims.username)
    }
}
