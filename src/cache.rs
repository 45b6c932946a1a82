//! Cache store abstraction over Redis.
//!
//! The store speaks raw bytes; JSON encoding and decoding is an explicit
//! step done by [`get_json`] / [`set_json`] or by the caller. A miss is a
//! `None`, distinguishable from a backend error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache codec error: {0}")]
    Codec(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<(), CacheError>;
    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, CacheError>;
    async fn hdel(&self, key: &str, field: &str) -> Result<(), CacheError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;
}

/// Cache key builders. All callers go through these so the key shapes stay
/// in one place.
pub mod keys {
    pub fn product(id: i64) -> String {
        format!("product:{id}")
    }

    pub fn product_list(limit: i64, offset: i64) -> String {
        format!("products:list:limit:{limit}:offset:{offset}")
    }

    pub fn cart(user_sso_id: i64) -> String {
        format!("cart:{user_sso_id}")
    }
}

pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, &bytes, ttl).await
}

/// Redis-backed store sharing one multiplexed connection between tasks.
#[derive(Clone)]
pub struct RedisCache {
    con: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(format!("redis://{addr}"))?;
        let con = client.get_multiplexed_async_connection().await?;
        tracing::info!(addr, "connected to cache");
        Ok(Self { con })
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut con = self.con.clone();
        let value: Option<Vec<u8>> = con.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut con = self.con.clone();
        let () = con.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut con = self.con.clone();
        let () = con.del(key).await?;
        Ok(())
    }

    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> Result<(), CacheError> {
        let mut con = self.con.clone();
        let () = con.hset(key, field, value).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut con = self.con.clone();
        let value: Option<Vec<u8>> = con.hget(key, field).await?;
        Ok(value)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, CacheError> {
        let mut con = self.con.clone();
        let values: HashMap<String, Vec<u8>> = con.hgetall(key).await?;
        Ok(values)
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), CacheError> {
        let mut con = self.con.clone();
        let () = con.hdel(key, field).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut con = self.con.clone();
        let () = con.expire(key, ttl.as_secs() as i64).await?;
        Ok(())
    }
}
