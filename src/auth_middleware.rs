use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::auth::{self, TokenError};

/// The HMAC secret bearer tokens are verified against. Extracted from
/// whatever state the router carries via [`FromRef`].
#[derive(Debug, Clone)]
pub struct AuthSecret(pub String);

/// Identity of an authenticated request. Adding this as a handler argument
/// makes the route protected: extraction fails with 401 when the bearer
/// token is missing, invalid or expired.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_sso_id: i64,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AuthSecret: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidToken)?;

        let AuthSecret(secret) = AuthSecret::from_ref(state);
        let claims = auth::verify_token(token, &secret).map_err(|err| match err {
            TokenError::Expired => AuthError::ExpiredToken,
            TokenError::Invalid => AuthError::InvalidToken,
        })?;

        Ok(AuthUser {
            user_sso_id: claims.uid,
        })
    }
}

#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    ExpiredToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingToken => "Missing authentication token",
            AuthError::InvalidToken => "Invalid token",
            AuthError::ExpiredToken => "Token has expired",
        };

        let body = json!({
            "error": message,
        });

        (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response()
    }
}
