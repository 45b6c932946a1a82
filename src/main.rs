use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sneakstore_backend::bus::consumer::BusConsumer;
use sneakstore_backend::bus::producer::{EventBus, KafkaBus, OrderEventProducer, PaymentEventProducer};
use sneakstore_backend::cache::{CacheStore, RedisCache};
use sneakstore_backend::config::Config;
use sneakstore_backend::filestore::S3FileStore;
use sneakstore_backend::gateway::clients::{
    HttpFavouritesClient, HttpSsoClient, LocalCartClient, LocalOrderClient, LocalProductClient,
};
use sneakstore_backend::gateway::router;
use sneakstore_backend::provider::YooKassaProvider;
use sneakstore_backend::repo::{PgCartStore, PgOrderStore, PgPaymentStore, PgProductStore};
use sneakstore_backend::services::order::PaymentProcessedHandler;
use sneakstore_backend::services::payment::OrderCreatedHandler;
use sneakstore_backend::services::{CartService, OrderService, PaymentService, ProductService};
use sneakstore_backend::shutdown::{self, DRAIN_TIMEOUT};
use sneakstore_backend::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sneakstore_backend=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);
    config.log_sanitized();

    // Row store
    tracing::info!("connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(25)
        .max_lifetime(Duration::from_secs(5 * 60))
        .connect(&config.database.url())
        .await
        .context("failed to connect to database")?;

    tracing::info!("running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    // Cache store
    let cache: Arc<dyn CacheStore> = Arc::new(
        RedisCache::connect(&config.redis_addr)
            .await
            .context("failed to connect to cache")?,
    );

    // Event bus
    let bus: Arc<dyn EventBus> =
        Arc::new(KafkaBus::connect(&config.kafka.brokers).context("failed to create producer")?);

    // Object store
    let files = Arc::new(
        S3FileStore::connect(&config.s3)
            .await
            .context("failed to connect to object store")?,
    );

    // Cores
    let product_service = Arc::new(ProductService::new(
        Arc::new(PgProductStore::new(pool.clone())),
        cache.clone(),
        files,
        config.cache_ttl,
    ));
    let cart_service = Arc::new(CartService::new(
        Arc::new(PgCartStore::new(pool.clone())),
        cache.clone(),
    ));
    let order_service = Arc::new(OrderService::new(
        Arc::new(PgOrderStore::new(pool.clone())),
        Arc::new(OrderEventProducer::new(
            bus.clone(),
            config.kafka.orders_topic.clone(),
        )),
    ));
    let payment_service = Arc::new(PaymentService::new(
        Arc::new(PgPaymentStore::new(pool.clone())),
        Arc::new(YooKassaProvider::new(&config.provider)),
        Arc::new(PaymentEventProducer::new(
            bus.clone(),
            config.kafka.payments_topic.clone(),
        )),
    ));

    // Bus consumers: the payment group reacts to new orders, the order
    // group reconciles payment outcomes.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let payment_consumer = BusConsumer::connect(
        &config.kafka.brokers,
        &config.kafka.orders_topic,
        "payment-service-group",
        bus.clone(),
        Arc::new(OrderCreatedHandler::new(payment_service.clone())),
    )
    .context("failed to create payment consumer")?;

    let order_consumer = BusConsumer::connect(
        &config.kafka.brokers,
        &config.kafka.payments_topic,
        "order-service-group",
        bus.clone(),
        Arc::new(PaymentProcessedHandler::new(order_service.clone())),
    )
    .context("failed to create order consumer")?;

    let mut consumer_tasks = vec![
        tokio::spawn(payment_consumer.run(shutdown_rx.clone())),
        tokio::spawn(order_consumer.run(shutdown_rx)),
    ];

    // Gateway
    let state = AppState {
        config: config.clone(),
        products: Arc::new(LocalProductClient::new(product_service)),
        cart: Arc::new(LocalCartClient::new(cart_service)),
        orders: Arc::new(LocalOrderClient::new(order_service)),
        favourites: Arc::new(HttpFavouritesClient::new(
            config.downstream.favourites_addr.clone(),
        )),
        sso: Arc::new(HttpSsoClient::new(config.downstream.sso_addr.clone())),
        payments: payment_service,
    };
    let app = router::build(state);

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .context("failed to bind listener")?;
    tracing::info!("server starting on {}", config.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await
        .context("server error")?;

    // Drain: stop consumers, then release shared resources.
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);

    let drained = tokio::time::timeout(
        DRAIN_TIMEOUT,
        futures::future::join_all(consumer_tasks.iter_mut()),
    )
    .await;
    if drained.is_err() {
        tracing::warn!("consumers did not stop within the drain window, aborting");
        for task in &consumer_tasks {
            task.abort();
        }
    }

    pool.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}
