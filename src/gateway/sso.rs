use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;

use super::error::ApiResult;
use super::extract::ValidatedJson;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/v1/auth/register
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CredentialsRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let ctx = state.call_context();
    let user_id = state.sso.register(&ctx, &req.email, &req.password).await?;
    Ok((StatusCode::CREATED, Json(json!({ "user_id": user_id }))))
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CredentialsRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ctx = state.call_context();
    let token = state.sso.login(&ctx, &req.email, &req.password).await?;
    Ok(Json(json!({ "token": token })))
}
