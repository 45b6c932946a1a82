use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::error::ApiResult;
use super::extract::ValidatedJson;
use crate::auth_middleware::AuthUser;
use crate::models::{Cart, CartItem};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub sneaker_id: i64,
    pub quantity: i32,
}

/// POST /api/v1/cart
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<AddToCartRequest>,
) -> ApiResult<(StatusCode, Json<CartItem>)> {
    let ctx = state.user_call_context(&user);
    let item = state.cart.add(&ctx, req.sneaker_id, req.quantity).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /api/v1/cart
pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Cart>> {
    let ctx = state.user_call_context(&user);
    let cart = state.cart.get(&ctx).await?;
    Ok(Json(cart))
}

/// GET /api/v1/cart/:id
pub async fn get_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<String>,
) -> ApiResult<Json<CartItem>> {
    let ctx = state.user_call_context(&user);
    let item = state.cart.get_item(&ctx, &item_id).await?;
    Ok(Json(item))
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

/// PUT /api/v1/cart/:id
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateQuantityRequest>,
) -> ApiResult<StatusCode> {
    let ctx = state.user_call_context(&user);
    state.cart.update_quantity(&ctx, &item_id, req.quantity).await?;
    Ok(StatusCode::OK)
}

/// DELETE /api/v1/cart/:id
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(item_id): Path<String>,
) -> ApiResult<StatusCode> {
    let ctx = state.user_call_context(&user);
    state.cart.remove(&ctx, &item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
