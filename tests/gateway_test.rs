/// End-to-end gateway behavior against faked downstreams.
///
/// Covers:
/// - Public product reads and RPC-status-to-HTTP error mapping
/// - Protected routes rejecting anonymous requests
/// - Order creation enriching items with the product price snapshot,
///   then best-effort clearing the cart
/// - Provider webhook and manual status update driving reconciliation
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use tower::util::ServiceExt;

use sneakstore_backend::auth::issue_token;
use sneakstore_backend::bus::producer::PaymentEvents;
use sneakstore_backend::bus::BusError;
use sneakstore_backend::config::{
    Config, DatabaseConfig, DownstreamConfig, KafkaConfig, ProviderConfig, S3Config,
};
use sneakstore_backend::error::ServiceError;
use sneakstore_backend::gateway::clients::{
    CartApi, FavouritesApi, OrderApi, ProductApi, SsoApi,
};
use sneakstore_backend::gateway::router;
use sneakstore_backend::models::{
    Cart, CartItem, Favourite, NewOrderItem, NewPayment, Order, OrderStatus, OrderWithItems,
    Payment, PaymentStatus, Sneaker,
};
use sneakstore_backend::provider::{CreatedPayment, PaymentProvider};
use sneakstore_backend::repo::PaymentStore;
use sneakstore_backend::rpc::{CallContext, Status};
use sneakstore_backend::services::PaymentService;
use sneakstore_backend::state::AppState;

const SECRET: &str = "gateway-test-secret";

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeProducts {
    sneakers: Vec<Sneaker>,
    unavailable: AtomicBool,
}

impl FakeProducts {
    fn check(&self) -> Result<(), Status> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Status::unavailable("product downstream unavailable"))
        } else {
            Ok(())
        }
    }

    fn find(&self, id: i64) -> Result<Sneaker, Status> {
        self.check()?;
        self.sneakers
            .iter()
            .find(|sneaker| sneaker.id == id)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("sneaker {id} not found")))
    }
}

#[async_trait]
impl ProductApi for FakeProducts {
    async fn list(&self, _: &CallContext, _: i64, _: i64) -> Result<Vec<Sneaker>, Status> {
        self.check()?;
        Ok(self.sneakers.clone())
    }

    async fn get(&self, _: &CallContext, id: i64) -> Result<Sneaker, Status> {
        self.find(id)
    }

    async fn get_many(&self, _: &CallContext, ids: &[i64]) -> Result<Vec<Sneaker>, Status> {
        self.check()?;
        Ok(ids.iter().filter_map(|id| self.find(*id).ok()).collect())
    }

    async fn add(&self, ctx: &CallContext, title: &str, price: i64) -> Result<Sneaker, Status> {
        ctx.require_user()?;
        self.check()?;
        Ok(Sneaker {
            id: 99,
            title: title.to_string(),
            price,
            image_key: String::new(),
        })
    }

    async fn delete(&self, ctx: &CallContext, _: i64) -> Result<(), Status> {
        ctx.require_user()?;
        Ok(())
    }

    async fn update_image(&self, ctx: &CallContext, _: i64, _: &str) -> Result<(), Status> {
        ctx.require_user()?;
        Ok(())
    }

    async fn generate_upload_url(
        &self,
        ctx: &CallContext,
        _: &str,
        _: &str,
    ) -> Result<(String, String), Status> {
        ctx.require_user()?;
        Ok((
            "https://store.example/upload".to_string(),
            "products/key.png".to_string(),
        ))
    }
}

#[derive(Default)]
struct FakeCart {
    clears: Mutex<Vec<i64>>,
    fail_clear: AtomicBool,
}

#[async_trait]
impl CartApi for FakeCart {
    async fn get(&self, ctx: &CallContext) -> Result<Cart, Status> {
        Ok(Cart::empty(ctx.require_user()?))
    }

    async fn get_item(&self, ctx: &CallContext, item_id: &str) -> Result<CartItem, Status> {
        ctx.require_user()?;
        Err(Status::not_found(format!("cart item {item_id} not found")))
    }

    async fn add(
        &self,
        ctx: &CallContext,
        sneaker_id: i64,
        quantity: i32,
    ) -> Result<CartItem, Status> {
        let user = ctx.require_user()?;
        Ok(CartItem {
            id: "1".to_string(),
            user_sso_id: user,
            sneaker_id,
            quantity,
            added_at: chrono::Utc::now(),
            synchronized: true,
        })
    }

    async fn update_quantity(&self, ctx: &CallContext, _: &str, _: i32) -> Result<(), Status> {
        ctx.require_user()?;
        Ok(())
    }

    async fn remove(&self, ctx: &CallContext, _: &str) -> Result<(), Status> {
        ctx.require_user()?;
        Ok(())
    }

    async fn clear(&self, ctx: &CallContext) -> Result<(), Status> {
        let user = ctx.require_user()?;
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(Status::unavailable("cart downstream unavailable"));
        }
        self.clears.lock().unwrap().push(user);
        Ok(())
    }
}

#[derive(Default)]
struct FakeOrders {
    created: Mutex<Vec<(i64, Vec<NewOrderItem>)>>,
}

#[async_trait]
impl OrderApi for FakeOrders {
    async fn create(&self, ctx: &CallContext, items: Vec<NewOrderItem>) -> Result<i64, Status> {
        let user = ctx.require_user()?;
        self.created.lock().unwrap().push((user, items));
        Ok(101)
    }

    async fn get(&self, ctx: &CallContext, order_id: i64) -> Result<OrderWithItems, Status> {
        ctx.require_user()?;
        let now = chrono::Utc::now();
        Ok(OrderWithItems {
            order: Order {
                id: order_id,
                user_id: 42,
                status: OrderStatus::PendingPayment,
                total_amount: 3000,
                payment_url: String::new(),
                created_at: now,
                updated_at: now,
            },
            items: Vec::new(),
        })
    }

    async fn list_for_user(&self, ctx: &CallContext) -> Result<Vec<OrderWithItems>, Status> {
        ctx.require_user()?;
        Ok(Vec::new())
    }
}

struct FakeFavourites;

#[async_trait]
impl FavouritesApi for FakeFavourites {
    async fn list(&self, ctx: &CallContext) -> Result<Vec<Favourite>, Status> {
        ctx.require_user()?;
        Ok(Vec::new())
    }

    async fn add(&self, ctx: &CallContext, _: i64) -> Result<(), Status> {
        ctx.require_user()?;
        Ok(())
    }

    async fn remove(&self, ctx: &CallContext, _: i64) -> Result<(), Status> {
        ctx.require_user()?;
        Ok(())
    }

    async fn is_favourite(&self, ctx: &CallContext, _: i64) -> Result<bool, Status> {
        ctx.require_user()?;
        Ok(false)
    }
}

struct FakeSso;

#[async_trait]
impl SsoApi for FakeSso {
    async fn register(&self, _: &CallContext, _: &str, _: &str) -> Result<i64, Status> {
        Ok(42)
    }

    async fn login(&self, _: &CallContext, _: &str, _: &str) -> Result<String, Status> {
        Ok("token".to_string())
    }
}

#[derive(Default)]
struct FakePaymentStore {
    payments: Mutex<Vec<Payment>>,
}

impl FakePaymentStore {
    fn seed(&self, order_id: i64, external_id: &str) {
        let now = chrono::Utc::now();
        self.payments.lock().unwrap().push(Payment {
            id: 1,
            order_id,
            external_id: external_id.to_string(),
            amount: 3000,
            currency: "RUB".to_string(),
            status: PaymentStatus::Pending,
            confirmation_url: "https://pay.example/xyz".to_string(),
            created_at: now,
            updated_at: now,
        });
    }
}

#[async_trait]
impl PaymentStore for FakePaymentStore {
    async fn insert(&self, _: &NewPayment) -> Result<bool, ServiceError> {
        Ok(true)
    }

    async fn update_status_by_external_id(
        &self,
        external_id: &str,
        status: PaymentStatus,
    ) -> Result<(), ServiceError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .iter_mut()
            .find(|payment| payment.external_id == external_id)
            .ok_or_else(|| ServiceError::NotFound("payment not found".to_string()))?;
        payment.status = status;
        Ok(())
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Payment, ServiceError> {
        self.payments
            .lock()
            .unwrap()
            .iter()
            .find(|payment| payment.external_id == external_id)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound("payment not found".to_string()))
    }
}

struct FakeProvider;

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_payment(
        &self,
        _: i64,
        _: &str,
        _: &str,
        _: &str,
    ) -> Result<CreatedPayment, ServiceError> {
        Ok(CreatedPayment {
            external_id: "ext-1".to_string(),
            status: "pending".to_string(),
            confirmation_url: "https://pay.example/xyz".to_string(),
        })
    }
}

#[derive(Default)]
struct FakePaymentEvents {
    published: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl PaymentEvents for FakePaymentEvents {
    async fn payment_processed(
        &self,
        order_id: i64,
        status: &str,
        _: &str,
        _: &str,
    ) -> Result<(), BusError> {
        self.published
            .lock()
            .unwrap()
            .push((order_id, status.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn test_config() -> Config {
    Config {
        listen: "127.0.0.1:0".to_string(),
        app_secret: SECRET.to_string(),
        request_timeout: Duration::from_secs(8),
        cors_allowed_origins: "*".to_string(),
        database: DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            dbname: "sneakstore".to_string(),
            sslmode: "disable".to_string(),
        },
        redis_addr: "localhost:6379".to_string(),
        kafka: KafkaConfig {
            brokers: "localhost:9092".to_string(),
            orders_topic: "orders".to_string(),
            payments_topic: "payments".to_string(),
        },
        cache_ttl: Duration::from_secs(600),
        downstream: DownstreamConfig {
            sso_addr: "http://localhost:8081".to_string(),
            favourites_addr: "http://localhost:8082".to_string(),
        },
        s3: S3Config {
            endpoint: "localhost:9000".to_string(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            bucket: "sneakers".to_string(),
        },
        provider: ProviderConfig {
            shop_id: String::new(),
            secret_key: String::new(),
            return_url: "http://localhost:3000/orders".to_string(),
            base_url: "https://api.yookassa.ru/v3".to_string(),
        },
    }
}

struct Harness {
    app: Router,
    products: Arc<FakeProducts>,
    cart: Arc<FakeCart>,
    orders: Arc<FakeOrders>,
    payment_store: Arc<FakePaymentStore>,
    payment_events: Arc<FakePaymentEvents>,
}

fn harness_with_products(sneakers: Vec<Sneaker>) -> Harness {
    let products = Arc::new(FakeProducts {
        sneakers,
        unavailable: AtomicBool::new(false),
    });
    let cart = Arc::new(FakeCart::default());
    let orders = Arc::new(FakeOrders::default());
    let payment_store = Arc::new(FakePaymentStore::default());
    let payment_events = Arc::new(FakePaymentEvents::default());
    let payments = Arc::new(PaymentService::new(
        payment_store.clone(),
        Arc::new(FakeProvider),
        payment_events.clone(),
    ));

    let state = AppState {
        config: Arc::new(test_config()),
        products: products.clone(),
        cart: cart.clone(),
        orders: orders.clone(),
        favourites: Arc::new(FakeFavourites),
        sso: Arc::new(FakeSso),
        payments,
    };

    Harness {
        app: router::build(state),
        products,
        cart,
        orders,
        payment_store,
        payment_events,
    }
}

fn harness() -> Harness {
    harness_with_products(vec![Sneaker {
        id: 7,
        title: "air-one".to_string(),
        price: 1500,
        image_key: String::new(),
    }])
}

fn bearer() -> String {
    format!(
        "Bearer {}",
        issue_token(SECRET, 42, Duration::from_secs(60)).unwrap()
    )
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: Method, uri: &str, authorized: bool, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if authorized {
        builder = builder.header(header::AUTHORIZATION, bearer());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Tests – products
// ---------------------------------------------------------------------------

#[tokio::test]
async fn products_are_publicly_listable() {
    let harness = harness();
    let response = harness.app.oneshot(get_request("/api/v1/products")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["price"], 1500);
}

#[tokio::test]
async fn missing_product_maps_to_404_with_message() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(get_request("/api/v1/products/123"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "sneaker 123 not found");
}

#[tokio::test]
async fn unavailable_downstream_maps_to_opaque_500() {
    let harness = harness();
    harness.products.unavailable.store(true, Ordering::SeqCst);

    let response = harness
        .app
        .oneshot(get_request("/api/v1/products/7"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "internal server error");
}

#[tokio::test]
async fn batch_lookup_parses_the_id_list() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(get_request("/api/v1/products/batch?ids=7,8"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn batch_lookup_rejects_malformed_ids() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(get_request("/api/v1/products/batch?ids=7,abc"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn product_writes_require_a_token() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/products",
            false,
            serde_json::json!({ "title": "air-two", "price": 900 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authorized_product_write_succeeds() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/products",
            true,
            serde_json::json!({ "title": "air-two", "price": 900 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["title"], "air-two");
}

// ---------------------------------------------------------------------------
// Tests – orders
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_order_snapshots_prices_and_clears_the_cart() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/orders",
            true,
            serde_json::json!({ "items": [{ "sneaker_id": 7, "quantity": 2 }] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(response).await["order_id"], 101);

    let created = harness.orders.created.lock().unwrap();
    let (user_id, items) = &created[0];
    assert_eq!(*user_id, 42);
    assert_eq!(items[0].price_at_purchase, 1500);
    assert_eq!(items[0].quantity, 2);

    assert_eq!(*harness.cart.clears.lock().unwrap(), vec![42]);
}

#[tokio::test]
async fn cart_clear_failure_does_not_fail_the_order() {
    let harness = harness();
    harness.cart.fail_clear.store(true, Ordering::SeqCst);

    let response = harness
        .app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/orders",
            true,
            serde_json::json!({ "items": [{ "sneaker_id": 7, "quantity": 2 }] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn unknown_sneaker_rejects_the_order() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/orders",
            true,
            serde_json::json!({ "items": [{ "sneaker_id": 999, "quantity": 1 }] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid sneaker_id");
    assert!(harness.orders.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn non_positive_quantity_rejects_the_order() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/orders",
            true,
            serde_json::json!({ "items": [{ "sneaker_id": 7, "quantity": 0 }] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_order_is_rejected() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(json_request(
            Method::POST,
            "/api/v1/orders",
            true,
            serde_json::json!({ "items": [] }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orders_require_a_token() {
    let harness = harness();
    let response = harness
        .app
        .oneshot(get_request("/api/v1/orders"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Tests – payment webhook
// ---------------------------------------------------------------------------

#[tokio::test]
async fn succeeded_webhook_reconciles_and_publishes_success() {
    let harness = harness();
    harness.payment_store.seed(55, "ext-1");

    let response = harness
        .app
        .oneshot(json_request(
            Method::POST,
            "/webhook/yookassa",
            false,
            serde_json::json!({
                "type": "notification",
                "event": "payment.succeeded",
                "object": { "id": "ext-1", "status": "succeeded" },
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        *harness.payment_events.published.lock().unwrap(),
        vec![(55, "SUCCESS".to_string())]
    );
}

#[tokio::test]
async fn unrelated_webhook_events_are_acknowledged_and_ignored() {
    let harness = harness();

    let response = harness
        .app
        .oneshot(json_request(
            Method::POST,
            "/webhook/yookassa",
            false,
            serde_json::json!({
                "event": "payment.waiting_for_capture",
                "object": { "id": "ext-1", "status": "waiting_for_capture" },
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(harness.payment_events.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn manual_status_update_for_unknown_payment_is_404() {
    let harness = harness();

    let response = harness
        .app
        .oneshot(json_request(
            Method::POST,
            "/api/manual-status-update",
            false,
            serde_json::json!({ "payment_id": "missing", "status": "succeeded" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
