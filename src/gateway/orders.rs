use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::error::{ApiError, ApiResult};
use super::extract::ValidatedJson;
use crate::auth_middleware::AuthUser;
use crate::models::{NewOrderItem, OrderWithItems};
use crate::rpc::Status;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<CreateOrderItemRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderItemRequest {
    pub sneaker_id: i64,
    pub quantity: i32,
}

/// POST /api/v1/orders
///
/// Composite flow: resolve each sneaker through the product downstream to
/// snapshot its current price, create the order, then best-effort clear
/// the cart. A failed cart clear is logged, not surfaced.
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if req.items.is_empty() {
        return Err(ApiError(Status::invalid_argument(
            "items must not be empty",
        )));
    }

    let ctx = state.user_call_context(&user);

    let mut items = Vec::with_capacity(req.items.len());
    for item in &req.items {
        if item.quantity < 1 {
            return Err(ApiError(Status::invalid_argument(
                "quantity must be at least 1",
            )));
        }

        let sneaker = state.products.get(&ctx, item.sneaker_id).await.map_err(|err| {
            tracing::error!(
                sneaker_id = item.sneaker_id,
                error = %err,
                "failed to resolve sneaker for order"
            );
            ApiError(Status::invalid_argument("invalid sneaker_id"))
        })?;

        items.push(NewOrderItem {
            sneaker_id: item.sneaker_id,
            quantity: item.quantity,
            price_at_purchase: sneaker.price,
        });
    }

    let order_id = state.orders.create(&ctx, items).await?;

    if let Err(err) = state.cart.clear(&ctx).await {
        tracing::warn!(
            user_id = user.user_sso_id,
            error = %err,
            "failed to clear cart after order creation"
        );
    }

    Ok((StatusCode::CREATED, Json(json!({ "order_id": order_id }))))
}

/// GET /api/v1/orders
pub async fn get_user_orders(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<OrderWithItems>>> {
    let ctx = state.user_call_context(&user);
    let orders = state.orders.list_for_user(&ctx).await?;
    Ok(Json(orders))
}

/// GET /api/v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<i64>,
) -> ApiResult<Json<OrderWithItems>> {
    let ctx = state.user_call_context(&user);
    let order = state.orders.get(&ctx, order_id).await?;
    Ok(Json(order))
}
