use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::{ApiError, ApiResult};
use super::extract::ValidatedJson;
use crate::auth_middleware::AuthUser;
use crate::models::Sneaker;
use crate::rpc::Status;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

/// GET /api/v1/products
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ListProductsQuery>,
) -> ApiResult<Json<Vec<Sneaker>>> {
    let ctx = state.call_context();
    let sneakers = state.products.list(&ctx, params.limit, params.offset).await?;
    Ok(Json(sneakers))
}

/// GET /api/v1/products/:id
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Sneaker>> {
    let ctx = state.call_context();
    let sneaker = state.products.get(&ctx, id).await?;
    Ok(Json(sneaker))
}

#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    pub ids: String,
}

/// GET /api/v1/products/batch?ids=1,2,3
pub async fn get_products_batch(
    State(state): State<AppState>,
    Query(params): Query<BatchQuery>,
) -> ApiResult<Json<Vec<Sneaker>>> {
    let ids = params
        .ids
        .split(',')
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            chunk
                .trim()
                .parse::<i64>()
                .map_err(|_| ApiError(Status::invalid_argument(format!("invalid id: {chunk}"))))
        })
        .collect::<Result<Vec<i64>, ApiError>>()?;

    if ids.is_empty() {
        return Err(ApiError(Status::invalid_argument("ids must not be empty")));
    }

    let ctx = state.call_context();
    let sneakers = state.products.get_many(&ctx, &ids).await?;
    Ok(Json(sneakers))
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub title: String,
    pub price: i64,
}

/// POST /api/v1/products
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<Sneaker>)> {
    let ctx = state.user_call_context(&user);
    let sneaker = state.products.add(&ctx, &req.title, req.price).await?;
    Ok((StatusCode::CREATED, Json(sneaker)))
}

/// DELETE /api/v1/products/:id
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let ctx = state.user_call_context(&user);
    state.products.delete(&ctx, id).await?;
    Ok(Json(json!({ "message": "sneaker deleted" })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateImageRequest {
    pub image_key: String,
}

/// POST /api/v1/products/:id/image
pub async fn update_product_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    ValidatedJson(req): ValidatedJson<UpdateImageRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ctx = state.user_call_context(&user);
    state.products.update_image(&ctx, id, &req.image_key).await?;
    Ok(Json(json!({ "message": "image updated" })))
}

#[derive(Debug, Deserialize)]
pub struct GenerateUploadUrlRequest {
    pub original_filename: String,
    pub content_type: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateUploadUrlResponse {
    pub upload_url: String,
    pub file_key: String,
}

/// POST /api/v1/images/generate-upload-url
pub async fn generate_upload_url(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<GenerateUploadUrlRequest>,
) -> ApiResult<Json<GenerateUploadUrlResponse>> {
    let ctx = state.user_call_context(&user);
    let (upload_url, file_key) = state
        .products
        .generate_upload_url(&ctx, &req.original_filename, &req.content_type)
        .await?;
    Ok(Json(GenerateUploadUrlResponse { upload_url, file_key }))
}
