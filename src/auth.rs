//! Bearer-token verification.
//!
//! Tokens are HMAC-SHA256 JWTs minted by the external identity service.
//! The only claims this process cares about are the numeric user id and
//! the expiry.

use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id issued by the identity provider.
    pub uid: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TokenError {
    Invalid,
    Expired,
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })
}

/// Mints a token the way the identity service does. Used by tooling and
/// tests; request handling only ever verifies.
pub fn issue_token(secret: &str, uid: i64, ttl: Duration) -> Result<String> {
    let exp = Utc::now()
        .checked_add_signed(chrono::Duration::seconds(ttl.as_secs() as i64))
        .ok_or_else(|| anyhow!("invalid expiry timestamp"))?
        .timestamp();

    let claims = Claims { uid, exp };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| anyhow!("failed to sign token: {err}"))
}
