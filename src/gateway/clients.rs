//! Downstream client interfaces the gateway fans out to, plus their
//! adapters.
//!
//! Product, cart and order run in this process and are reached through
//! [`crate::rpc::call_with_retry`] so they share the same deadline, retry
//! and status-code semantics as remote collaborators. Identity (SSO) and
//! favourites stay external and are reached over HTTP. Each call carries
//! the [`CallContext`] with the caller identity and the request deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::models::{Cart, CartItem, Favourite, NewOrderItem, OrderWithItems, Sneaker};
use crate::rpc::{call_with_retry, CallContext, Code, RetryPolicy, Status};
use crate::services::{CartService, OrderService, ProductService};

pub const USER_ID_HEADER: &str = "x-user-id";

#[async_trait]
pub trait ProductApi: Send + Sync {
    async fn list(&self, ctx: &CallContext, limit: i64, offset: i64)
        -> Result<Vec<Sneaker>, Status>;
    async fn get(&self, ctx: &CallContext, id: i64) -> Result<Sneaker, Status>;
    async fn get_many(&self, ctx: &CallContext, ids: &[i64]) -> Result<Vec<Sneaker>, Status>;
    async fn add(&self, ctx: &CallContext, title: &str, price: i64) -> Result<Sneaker, Status>;
    async fn delete(&self, ctx: &CallContext, id: i64) -> Result<(), Status>;
    async fn update_image(&self, ctx: &CallContext, id: i64, image_key: &str)
        -> Result<(), Status>;
    async fn generate_upload_url(
        &self,
        ctx: &CallContext,
        filename: &str,
        content_type: &str,
    ) -> Result<(String, String), Status>;
}

#[async_trait]
pub trait CartApi: Send + Sync {
    async fn get(&self, ctx: &CallContext) -> Result<Cart, Status>;
    async fn get_item(&self, ctx: &CallContext, item_id: &str) -> Result<CartItem, Status>;
    async fn add(&self, ctx: &CallContext, sneaker_id: i64, quantity: i32)
        -> Result<CartItem, Status>;
    async fn update_quantity(
        &self,
        ctx: &CallContext,
        item_id: &str,
        quantity: i32,
    ) -> Result<(), Status>;
    async fn remove(&self, ctx: &CallContext, item_id: &str) -> Result<(), Status>;
    async fn clear(&self, ctx: &CallContext) -> Result<(), Status>;
}

#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn create(&self, ctx: &CallContext, items: Vec<NewOrderItem>) -> Result<i64, Status>;
    async fn get(&self, ctx: &CallContext, order_id: i64) -> Result<OrderWithItems, Status>;
    async fn list_for_user(&self, ctx: &CallContext) -> Result<Vec<OrderWithItems>, Status>;
}

#[async_trait]
pub trait FavouritesApi: Send + Sync {
    async fn list(&self, ctx: &CallContext) -> Result<Vec<Favourite>, Status>;
    async fn add(&self, ctx: &CallContext, sneaker_id: i64) -> Result<(), Status>;
    async fn remove(&self, ctx: &CallContext, sneaker_id: i64) -> Result<(), Status>;
    async fn is_favourite(&self, ctx: &CallContext, sneaker_id: i64) -> Result<bool, Status>;
}

#[async_trait]
pub trait SsoApi: Send + Sync {
    async fn register(&self, ctx: &CallContext, email: &str, password: &str)
        -> Result<i64, Status>;
    async fn login(&self, ctx: &CallContext, email: &str, password: &str)
        -> Result<String, Status>;
}

// ---------------------------------------------------------------------------
// In-process adapters
// ---------------------------------------------------------------------------

pub struct LocalProductClient {
    service: Arc<ProductService>,
    policy: RetryPolicy,
}

impl LocalProductClient {
    pub fn new(service: Arc<ProductService>) -> Self {
        Self {
            service,
            policy: RetryPolicy::idempotent(),
        }
    }
}

#[async_trait]
impl ProductApi for LocalProductClient {
    async fn list(
        &self,
        ctx: &CallContext,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Sneaker>, Status> {
        call_with_retry(ctx, &self.policy, || async move {
            self.service.get_all(limit, offset).await.map_err(Status::from)
        })
        .await
    }

    async fn get(&self, ctx: &CallContext, id: i64) -> Result<Sneaker, Status> {
        call_with_retry(ctx, &self.policy, || async move {
            self.service.get_by_id(id).await.map_err(Status::from)
        })
        .await
    }

    async fn get_many(&self, ctx: &CallContext, ids: &[i64]) -> Result<Vec<Sneaker>, Status> {
        call_with_retry(ctx, &self.policy, || async move {
            self.service.get_by_ids(ids).await.map_err(Status::from)
        })
        .await
    }

    async fn add(&self, ctx: &CallContext, title: &str, price: i64) -> Result<Sneaker, Status> {
        call_with_retry(ctx, &self.policy, || async move {
            self.service.add(title, price).await.map_err(Status::from)
        })
        .await
    }

    async fn delete(&self, ctx: &CallContext, id: i64) -> Result<(), Status> {
        call_with_retry(ctx, &self.policy, || async move {
            self.service.delete(id).await.map_err(Status::from)
        })
        .await
    }

    async fn update_image(
        &self,
        ctx: &CallContext,
        id: i64,
        image_key: &str,
    ) -> Result<(), Status> {
        call_with_retry(ctx, &self.policy, || async move {
            self.service.update_image(id, image_key).await.map_err(Status::from)
        })
        .await
    }

    async fn generate_upload_url(
        &self,
        ctx: &CallContext,
        filename: &str,
        content_type: &str,
    ) -> Result<(String, String), Status> {
        call_with_retry(ctx, &self.policy, || async move {
            self.service
                .generate_upload_url(filename, content_type)
                .await
                .map_err(Status::from)
        })
        .await
    }
}

pub struct LocalCartClient {
    service: Arc<CartService>,
    policy: RetryPolicy,
}

impl LocalCartClient {
    pub fn new(service: Arc<CartService>) -> Self {
        Self {
            service,
            policy: RetryPolicy::idempotent(),
        }
    }
}

#[async_trait]
impl CartApi for LocalCartClient {
    async fn get(&self, ctx: &CallContext) -> Result<Cart, Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            self.service.get(user_id).await.map_err(Status::from)
        })
        .await
    }

    async fn get_item(&self, ctx: &CallContext, item_id: &str) -> Result<CartItem, Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            self.service.get_item(user_id, item_id).await.map_err(Status::from)
        })
        .await
    }

    async fn add(
        &self,
        ctx: &CallContext,
        sneaker_id: i64,
        quantity: i32,
    ) -> Result<CartItem, Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            self.service
                .add(user_id, sneaker_id, quantity)
                .await
                .map_err(Status::from)
        })
        .await
    }

    async fn update_quantity(
        &self,
        ctx: &CallContext,
        item_id: &str,
        quantity: i32,
    ) -> Result<(), Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            self.service
                .update_quantity(user_id, item_id, quantity)
                .await
                .map_err(Status::from)
        })
        .await
    }

    async fn remove(&self, ctx: &CallContext, item_id: &str) -> Result<(), Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            self.service.remove(user_id, item_id).await.map_err(Status::from)
        })
        .await
    }

    async fn clear(&self, ctx: &CallContext) -> Result<(), Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            self.service.clear(user_id).await.map_err(Status::from)
        })
        .await
    }
}

pub struct LocalOrderClient {
    service: Arc<OrderService>,
    policy: RetryPolicy,
}

impl LocalOrderClient {
    pub fn new(service: Arc<OrderService>) -> Self {
        Self {
            service,
            policy: RetryPolicy::idempotent(),
        }
    }
}

#[async_trait]
impl OrderApi for LocalOrderClient {
    async fn create(&self, ctx: &CallContext, items: Vec<NewOrderItem>) -> Result<i64, Status> {
        let user_id = ctx.require_user()?;
        let items = &items;
        call_with_retry(ctx, &self.policy, || async move {
            self.service
                .create(user_id, items.clone())
                .await
                .map(|order| order.order.id)
                .map_err(Status::from)
        })
        .await
    }

    async fn get(&self, ctx: &CallContext, order_id: i64) -> Result<OrderWithItems, Status> {
        call_with_retry(ctx, &self.policy, || async move {
            self.service.get(order_id).await.map_err(Status::from)
        })
        .await
    }

    async fn list_for_user(&self, ctx: &CallContext) -> Result<Vec<OrderWithItems>, Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            self.service.list_for_user(user_id).await.map_err(Status::from)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// HTTP adapters for out-of-process collaborators
// ---------------------------------------------------------------------------

fn transport_status(err: reqwest::Error) -> Status {
    if err.is_timeout() {
        Status::deadline_exceeded(err.to_string())
    } else {
        Status::unavailable(err.to_string())
    }
}

async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, Status> {
    let http_status = response.status();
    if http_status.is_success() {
        return Ok(response);
    }

    let code = match http_status.as_u16() {
        400 => Code::InvalidArgument,
        401 => Code::Unauthenticated,
        404 => Code::NotFound,
        408 => Code::DeadlineExceeded,
        409 => Code::AlreadyExists,
        status if status >= 500 => Code::Unavailable,
        _ => Code::Internal,
    };

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("downstream returned status {http_status}"));

    Err(Status::new(code, message))
}

fn http_client(per_attempt_timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(per_attempt_timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub struct HttpSsoClient {
    base_url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpSsoClient {
    pub fn new(base_url: String) -> Self {
        let policy = RetryPolicy::idempotent();
        Self {
            client: http_client(policy.per_attempt_timeout),
            base_url,
            policy,
        }
    }
}

#[async_trait]
impl SsoApi for HttpSsoClient {
    async fn register(
        &self,
        ctx: &CallContext,
        email: &str,
        password: &str,
    ) -> Result<i64, Status> {
        call_with_retry(ctx, &self.policy, || async move {
            let response = self
                .client
                .post(format!("{}/register", self.base_url))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await
                .map_err(transport_status)?;
            let response = check_response(response).await?;

            #[derive(Deserialize)]
            struct RegisterResponse {
                user_id: i64,
            }
            let body: RegisterResponse = response
                .json()
                .await
                .map_err(|err| Status::internal(err.to_string()))?;
            Ok(body.user_id)
        })
        .await
    }

    async fn login(
        &self,
        ctx: &CallContext,
        email: &str,
        password: &str,
    ) -> Result<String, Status> {
        call_with_retry(ctx, &self.policy, || async move {
            let response = self
                .client
                .post(format!("{}/login", self.base_url))
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await
                .map_err(transport_status)?;
            let response = check_response(response).await?;

            #[derive(Deserialize)]
            struct LoginResponse {
                token: String,
            }
            let body: LoginResponse = response
                .json()
                .await
                .map_err(|err| Status::internal(err.to_string()))?;
            Ok(body.token)
        })
        .await
    }
}

pub struct HttpFavouritesClient {
    base_url: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpFavouritesClient {
    pub fn new(base_url: String) -> Self {
        let policy = RetryPolicy::idempotent();
        Self {
            client: http_client(policy.per_attempt_timeout),
            base_url,
            policy,
        }
    }
}

#[async_trait]
impl FavouritesApi for HttpFavouritesClient {
    async fn list(&self, ctx: &CallContext) -> Result<Vec<Favourite>, Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            let response = self
                .client
                .get(format!("{}/favourites", self.base_url))
                .header(USER_ID_HEADER, user_id)
                .send()
                .await
                .map_err(transport_status)?;
            let response = check_response(response).await?;
            response
                .json::<Vec<Favourite>>()
                .await
                .map_err(|err| Status::internal(err.to_string()))
        })
        .await
    }

    async fn add(&self, ctx: &CallContext, sneaker_id: i64) -> Result<(), Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            let response = self
                .client
                .post(format!("{}/favourites", self.base_url))
                .header(USER_ID_HEADER, user_id)
                .json(&json!({ "sneaker_id": sneaker_id }))
                .send()
                .await
                .map_err(transport_status)?;
            check_response(response).await.map(|_| ())
        })
        .await
    }

    async fn remove(&self, ctx: &CallContext, sneaker_id: i64) -> Result<(), Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            let response = self
                .client
                .delete(format!("{}/favourites/{sneaker_id}", self.base_url))
                .header(USER_ID_HEADER, user_id)
                .send()
                .await
                .map_err(transport_status)?;
            check_response(response).await.map(|_| ())
        })
        .await
    }

    async fn is_favourite(&self, ctx: &CallContext, sneaker_id: i64) -> Result<bool, Status> {
        let user_id = ctx.require_user()?;
        call_with_retry(ctx, &self.policy, || async move {
            let response = self
                .client
                .get(format!("{}/favourites/{sneaker_id}", self.base_url))
                .header(USER_ID_HEADER, user_id)
                .send()
                .await
                .map_err(transport_status)?;
            let response = check_response(response).await?;

            #[derive(Deserialize)]
            struct IsFavouriteResponse {
                is_favourite: bool,
            }
            let body: IsFavouriteResponse = response
                .json()
                .await
                .map_err(|err| Status::internal(err.to_string()))?;
            Ok(body.is_favourite)
        })
        .await
    }
}
