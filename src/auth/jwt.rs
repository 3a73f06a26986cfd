//! HS256 JWT signing and validation.
//!
//! The server only verifies tokens. `issue_token` backs the `issue-token`
//! CLI command, which mints tokens signed with the configured secret.

use crate::AuthConfig;
use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity used for every request when authentication is not configured.
pub const ANONYMOUS_USER_ID: Uuid = Uuid::nil();

/// JWT claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Member UUID
    pub sub: String,
    pub email: String,
    pub name: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Claims injected in open (no-auth) mode
    pub fn anonymous() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: ANONYMOUS_USER_ID.to_string(),
            email: "anonymous@local".to_string(),
            name: "Anonymous".to_string(),
            iat: now,
            exp: now + 86400 * 365,
        }
    }

    pub fn user_id(&self) -> Result<Uuid> {
        self.sub.parse().context("subject is not a UUID")
    }
}

/// Sign a token for `user_id` valid for `expiry_secs`.
pub fn encode_jwt(
    user_id: Uuid,
    email: &str,
    name: &str,
    secret: &str,
    expiry_secs: u64,
) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        name: name.to_string(),
        iat: now,
        exp: now + expiry_secs as i64,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to encode JWT")
}

/// Sign a token under `config`, valid for `config.jwt_expiry_secs`.
///
/// Refuses emails the middleware would reject for their domain.
pub fn issue_token(config: &AuthConfig, user_id: Uuid, email: &str, name: &str) -> Result<String> {
    if let Some(ref domain) = config.allowed_email_domain {
        if !email.ends_with(&format!("@{}", domain)) {
            anyhow::bail!("email {} is outside the allowed domain @{}", email, domain);
        }
    }
    encode_jwt(user_id, email, name, &config.jwt_secret, config.jwt_expiry_secs)
}

/// Verify signature and expiry, returning the claims.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims> {
    let token_data: TokenData<Claims> = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .context("Failed to decode JWT")?;

    Ok(token_data.claims)
}
