//! Session token issuance and verification.
//!
//! Authentication is deliberately simple: a single configured admin
//! credential pair, exchanged for a signed, expiring token on login. Every
//! protected endpoint only consumes the "request is authorized" fact
//! produced here.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use mediagate_service::config::AuthConfig;

/// The claims carried in a session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The logged-in username.
    pub username: String,
    /// Expiry as a unix timestamp.
    pub exp: i64,
}

/// Issues and verifies session tokens.
#[derive(Debug, Clone)]
pub struct AuthContext {
    config: AuthConfig,
}

impl AuthContext {
    pub fn new(config: AuthConfig) -> Self {
        if config.secret.is_empty() {
            tracing::warn!("auth secret is empty, issued tokens are trivially forgeable");
        }
        if config.password.is_empty() {
            tracing::warn!("auth password is empty, login is disabled");
        }
        Self { config }
    }

    /// Whether the given credentials match the configured admin account.
    ///
    /// An empty configured password never matches.
    pub fn check_credentials(&self, username: &str, password: &str) -> bool {
        !self.config.password.is_empty()
            && username == self.config.username
            && password == self.config.password
    }

    /// Issues a signed token for `username`.
    pub fn issue_token(&self, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let expiry = chrono::Duration::from_std(self.config.token_expiry)
            .unwrap_or_else(|_| chrono::Duration::try_days(7).unwrap_or_default());
        let claims = Claims {
            username: username.to_owned(),
            exp: (Utc::now() + expiry).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
    }

    /// Verifies a raw token and returns its claims.
    pub fn verify_token(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .ok()
    }

    /// Extracts and verifies the bearer token of a request.
    ///
    /// Returns `None` for missing, malformed, expired, or forged tokens; a
    /// bad token is never an internal error.
    pub fn authorize(&self, headers: &HeaderMap) -> Option<Claims> {
        let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = header.strip_prefix("Bearer ")?;
        self.verify_token(token)
    }
}

/// Builds an [`AuthConfig`] for tests.
#[cfg(test)]
pub fn test_config() -> AuthConfig {
    AuthConfig {
        username: "gatekeeper".to_owned(),
        password: "hunter2".to_owned(),
        secret: "test-secret".to_owned(),
        token_expiry: std::time::Duration::from_secs(3600),
    }
}
