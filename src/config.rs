//! Environment configuration loading and validation.
//!
//! The whole configuration is read once at startup into a single immutable
//! [`Config`] value that gets injected into every component. Startup fails
//! fast with a clear message when required variables are missing or
//! malformed.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Gateway listen address, e.g. `0.0.0.0:8080`.
    pub listen: String,
    /// HMAC secret used to verify bearer tokens.
    pub app_secret: String,
    /// Overall per-request budget the gateway hands to downstream calls.
    pub request_timeout: Duration,
    /// Comma-separated allowed CORS origins, or `*`.
    pub cors_allowed_origins: String,
    pub database: DatabaseConfig,
    /// Cache server address, e.g. `localhost:6379`.
    pub redis_addr: String,
    pub kafka: KafkaConfig,
    /// TTL for single-product cache entries; list entries live half as long.
    pub cache_ttl: Duration,
    pub downstream: DownstreamConfig,
    pub s3: S3Config,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: String,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.dbname, self.sslmode
        )
    }
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated broker list.
    pub brokers: String,
    pub orders_topic: String,
    pub payments_topic: String,
}

/// Addresses of the collaborators that stay out of process. Product, cart
/// and order run in this process and need no address.
#[derive(Debug, Clone)]
pub struct DownstreamConfig {
    pub sso_addr: String,
    pub favourites_addr: String,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub shop_id: String,
    pub secret_key: String,
    pub return_url: String,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let app_secret =
            env::var("APP_SECRET").context("missing required environment variable: APP_SECRET")?;

        Ok(Self {
            listen: var_or("LISTEN_ADDR", "0.0.0.0:8080"),
            app_secret,
            request_timeout: Duration::from_secs(parsed_var("GATEWAY_REQUEST_TIMEOUT_SECS", 8)?),
            cors_allowed_origins: var_or("CORS_ALLOWED_ORIGINS", "*"),
            database: DatabaseConfig {
                host: var_or("DB_HOST", "localhost"),
                port: parsed_var("DB_PORT", 5432)?,
                user: var_or("DB_USER", "postgres"),
                password: var_or("DB_PASSWORD", "postgres"),
                dbname: var_or("DB_NAME", "sneakstore"),
                sslmode: var_or("DB_SSLMODE", "disable"),
            },
            redis_addr: var_or("REDIS_ADDR", "localhost:6379"),
            kafka: KafkaConfig {
                brokers: var_or("KAFKA_BROKERS", "localhost:9092"),
                orders_topic: var_or("KAFKA_ORDERS_TOPIC", "orders"),
                payments_topic: var_or("KAFKA_PAYMENTS_TOPIC", "payments"),
            },
            cache_ttl: Duration::from_secs(parsed_var("CACHE_TTL_SECS", 600)?),
            downstream: DownstreamConfig {
                sso_addr: var_or("SSO_ADDR", "http://localhost:8081"),
                favourites_addr: var_or("FAVOURITES_ADDR", "http://localhost:8082"),
            },
            s3: S3Config {
                endpoint: var_or("S3_ENDPOINT", "localhost:9000"),
                access_key: var_or("S3_ACCESS_KEY", "minioadmin"),
                secret_key: var_or("S3_SECRET_KEY", "minioadmin"),
                bucket: var_or("S3_BUCKET", "sneakers"),
            },
            provider: ProviderConfig {
                shop_id: var_or("PAYMENT_SHOP_ID", ""),
                secret_key: var_or("PAYMENT_SECRET_KEY", ""),
                return_url: var_or("PAYMENT_RETURN_URL", "http://localhost:3000/orders"),
                base_url: var_or("PAYMENT_BASE_URL", "https://api.yookassa.ru/v3"),
            },
        })
    }

    /// Logs the effective configuration without secrets.
    pub fn log_sanitized(&self) {
        tracing::info!("configuration:");
        tracing::info!("  LISTEN_ADDR: {}", self.listen);
        tracing::info!("  DATABASE: {}", sanitize_url(&self.database.url()));
        tracing::info!("  REDIS_ADDR: {}", self.redis_addr);
        tracing::info!("  KAFKA_BROKERS: {}", self.kafka.brokers);
        tracing::info!(
            "  KAFKA_TOPICS: {} / {}",
            self.kafka.orders_topic,
            self.kafka.payments_topic
        );
        tracing::info!("  CACHE_TTL_SECS: {}", self.cache_ttl.as_secs());
        tracing::info!("  CORS_ALLOWED_ORIGINS: {}", self.cors_allowed_origins);
        tracing::info!("  SSO_ADDR: {}", self.downstream.sso_addr);
        tracing::info!("  FAVOURITES_ADDR: {}", self.downstream.favourites_addr);
        tracing::info!("  S3_ENDPOINT: {}", self.s3.endpoint);
        tracing::info!("  S3_BUCKET: {}", self.s3.bucket);
        tracing::info!("  PAYMENT_BASE_URL: {}", self.provider.base_url);
        if !self.provider.shop_id.is_empty() {
            tracing::info!("  PAYMENT_SHOP_ID: {}", self.provider.shop_id);
            tracing::info!("  PAYMENT_SECRET_KEY: [REDACTED]");
        }
        tracing::info!("  APP_SECRET: [REDACTED]");
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("invalid value for environment variable {name}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

/// Hide the password portion of a connection URL.
fn sanitize_url(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(scheme_end) = url.find("://") {
            if let Some(colon_pos) = url[scheme_end + 3..at_pos].find(':') {
                let user_end = scheme_end + 3 + colon_pos;
                return format!("{}:****{}", &url[..user_end], &url[at_pos..]);
            }
        }
    }
    url.to_string()
}
