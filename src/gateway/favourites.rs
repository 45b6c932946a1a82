use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::error::ApiResult;
use super::extract::ValidatedJson;
use crate::auth_middleware::AuthUser;
use crate::models::Favourite;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddFavouriteRequest {
    pub sneaker_id: i64,
}

/// POST /api/v1/favourites
pub async fn add_favourite(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<AddFavouriteRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let ctx = state.user_call_context(&user);
    state.favourites.add(&ctx, req.sneaker_id).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "added to favourites" }))))
}

/// GET /api/v1/favourites
pub async fn list_favourites(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Favourite>>> {
    let ctx = state.user_call_context(&user);
    let favourites = state.favourites.list(&ctx).await?;
    Ok(Json(favourites))
}

/// GET /api/v1/favourites/:id
pub async fn get_favourite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(sneaker_id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let ctx = state.user_call_context(&user);
    let is_favourite = state.favourites.is_favourite(&ctx, sneaker_id).await?;
    Ok(Json(json!({ "sneaker_id": sneaker_id, "is_favourite": is_favourite })))
}

/// DELETE /api/v1/favourites/:id
pub async fn remove_favourite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(sneaker_id): Path<i64>,
) -> ApiResult<StatusCode> {
    let ctx = state.user_call_context(&user);
    state.favourites.remove(&ctx, sneaker_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
