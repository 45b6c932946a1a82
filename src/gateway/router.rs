use std::time::Duration;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::{cart, favourites, orders, products, sso, webhook};
use crate::state::AppState;

/// Mirrors `CORS_ALLOWED_ORIGINS`: `*` opens up anonymously, a
/// comma-separated list pins origins and allows credentials.
pub fn cors_layer(cors_allowed_origins: &str) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
        Method::HEAD,
    ];

    if cors_allowed_origins.trim() == "*" {
        return CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(Any)
            .allow_origin(Any)
            .max_age(Duration::from_secs(3600));
    }

    let origins: Vec<axum::http::HeaderValue> = cors_allowed_origins
        .split(',')
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_methods(methods)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(origins)
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn build(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    let api_v1 = Router::new()
        // identity
        .route("/auth/register", post(sso::register))
        .route("/auth/login", post(sso::login))
        // products; reads are public, writes require a bearer token
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route("/products/batch", get(products::get_products_batch))
        .route(
            "/products/:id",
            get(products::get_product).delete(products::delete_product),
        )
        .route("/products/:id/image", post(products::update_product_image))
        .route("/images/generate-upload-url", post(products::generate_upload_url))
        // cart
        .route("/cart", get(cart::get_cart).post(cart::add_to_cart))
        .route(
            "/cart/:id",
            get(cart::get_cart_item)
                .put(cart::update_cart_item)
                .delete(cart::remove_cart_item),
        )
        // favourites
        .route(
            "/favourites",
            get(favourites::list_favourites).post(favourites::add_favourite),
        )
        .route(
            "/favourites/:id",
            get(favourites::get_favourite).delete(favourites::remove_favourite),
        )
        // orders
        .route("/orders", get(orders::get_user_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order));

    Router::new()
        .route("/health", get(health_check))
        .route("/webhook/yookassa", post(webhook::provider_webhook))
        .route("/api/manual-status-update", post(webhook::manual_status_update))
        .nest("/api/v1", api_v1)
        .layer(cors)
        .with_state(state)
}
