//! Cart core: Cache-Aside between the row store and a per-user hash cache.
//!
//! Reads try the cache hash first and fall through to the row store on a
//! miss or an empty hit, then repopulate. Writes commit to the row store
//! first, then apply the matching surgical mutation to the cache; if that
//! mutation fails the whole hash is invalidated so the next read repairs
//! it from the authoritative rows.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cache::{keys, CacheError, CacheStore};
use crate::error::ServiceError;
use crate::models::{Cart, CartItem};
use crate::repo::CartStore;

pub const CART_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Typed view of the `cart:{user}` hash: field per item id, JSON-encoded
/// item as the value.
struct CartCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl CartCache {
    fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Key for items that never went through the row store.
    fn generated_item_id(user_sso_id: i64, sneaker_id: i64) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        format!("{user_sso_id}{sneaker_id}{nanos}")
    }

    async fn items(&self, user_sso_id: i64) -> Result<Vec<CartItem>, CacheError> {
        let key = keys::cart(user_sso_id);
        let fields = self.store.hgetall(&key).await?;

        let mut items = Vec::with_capacity(fields.len());
        for value in fields.values() {
            items.push(serde_json::from_slice::<CartItem>(value)?);
        }
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn put_full(&self, user_sso_id: i64, items: &[CartItem]) -> Result<(), CacheError> {
        let key = keys::cart(user_sso_id);
        self.store.delete(&key).await?;
        for item in items {
            let value = serde_json::to_vec(item)?;
            self.store.hset(&key, &item.id, &value).await?;
        }
        self.store.expire(&key, self.ttl).await
    }

    async fn upsert_item(&self, user_sso_id: i64, item: &CartItem) -> Result<(), CacheError> {
        let key = keys::cart(user_sso_id);
        let mut item = item.clone();
        if item.id.is_empty() {
            item.id = Self::generated_item_id(user_sso_id, item.sneaker_id);
        }

        let value = serde_json::to_vec(&item)?;
        self.store.hset(&key, &item.id, &value).await?;
        self.store.expire(&key, self.ttl).await
    }

    async fn item(&self, user_sso_id: i64, item_id: &str) -> Result<Option<CartItem>, CacheError> {
        let key = keys::cart(user_sso_id);
        match self.store.hget(&key, item_id).await? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    async fn set_quantity(
        &self,
        user_sso_id: i64,
        item_id: &str,
        quantity: i32,
    ) -> Result<(), CacheError> {
        let mut item = self
            .item(user_sso_id, item_id)
            .await?
            .ok_or_else(|| CacheError::Backend(format!("cart item {item_id} not cached")))?;

        item.quantity = quantity;
        item.synchronized = false;

        let value = serde_json::to_vec(&item)?;
        self.store.hset(&keys::cart(user_sso_id), item_id, &value).await
    }

    async fn remove_item(&self, user_sso_id: i64, item_id: &str) -> Result<(), CacheError> {
        self.store.hdel(&keys::cart(user_sso_id), item_id).await
    }

    async fn invalidate(&self, user_sso_id: i64) -> Result<(), CacheError> {
        self.store.delete(&keys::cart(user_sso_id)).await
    }
}

pub struct CartService {
    store: Arc<dyn CartStore>,
    cache: CartCache,
}

impl CartService {
    pub fn new(store: Arc<dyn CartStore>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            cache: CartCache::new(cache, CART_CACHE_TTL),
        }
    }

    /// On a surgical cache mutation failure, fall back to invalidating the
    /// whole hash; the next read repairs from the row store.
    async fn compensate(&self, user_sso_id: i64, err: &CacheError) {
        tracing::warn!(user_sso_id, error = %err, "failed to update cart cache");
        if let Err(invalidate_err) = self.cache.invalidate(user_sso_id).await {
            tracing::warn!(
                user_sso_id,
                error = %invalidate_err,
                "also failed to invalidate cart cache"
            );
        }
    }

    pub async fn get(&self, user_sso_id: i64) -> Result<Cart, ServiceError> {
        match self.cache.items(user_sso_id).await {
            Ok(items) if !items.is_empty() => {
                tracing::debug!(user_sso_id, "cart cache hit");
                return Ok(Cart {
                    user_sso_id,
                    items,
                    updated_at: Utc::now(),
                });
            }
            // An empty hit is re-verified against the row store so a fresh
            // user's first items are never shadowed by a stale empty hash.
            Ok(_) => tracing::debug!(user_sso_id, "cart cache empty, checking row store"),
            Err(err) => tracing::warn!(user_sso_id, error = %err, "failed to read cart cache"),
        }

        let cart = self
            .store
            .get_cart(user_sso_id)
            .await
            .map_err(|err| err.context("cart.get"))?;

        if let Err(err) = self.cache.put_full(user_sso_id, &cart.items).await {
            tracing::warn!(user_sso_id, error = %err, "failed to cache cart");
        }

        Ok(cart)
    }

    pub async fn get_item(&self, user_sso_id: i64, item_id: &str) -> Result<CartItem, ServiceError> {
        match self.cache.item(user_sso_id, item_id).await {
            Ok(Some(item)) => return Ok(item),
            Ok(None) => {}
            Err(err) => tracing::warn!(user_sso_id, error = %err, "failed to read cart cache"),
        }

        let cart = self
            .store
            .get_cart(user_sso_id)
            .await
            .map_err(|err| err.context("cart.get_item"))?;
        cart.items
            .into_iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| ServiceError::NotFound(format!("cart item {item_id} not found")))
    }

    pub async fn add(
        &self,
        user_sso_id: i64,
        sneaker_id: i64,
        quantity: i32,
    ) -> Result<CartItem, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let item = self
            .store
            .add_item(user_sso_id, sneaker_id, quantity, Utc::now())
            .await
            .map_err(|err| err.context("cart.add"))?;

        if let Err(err) = self.cache.upsert_item(user_sso_id, &item).await {
            self.compensate(user_sso_id, &err).await;
        }

        tracing::info!(user_sso_id, sneaker_id, "item added to cart");
        Ok(item)
    }

    pub async fn update_quantity(
        &self,
        user_sso_id: i64,
        item_id: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        self.store
            .update_quantity(user_sso_id, item_id, quantity)
            .await
            .map_err(|err| err.context("cart.update_quantity"))?;

        if let Err(err) = self.cache.set_quantity(user_sso_id, item_id, quantity).await {
            self.compensate(user_sso_id, &err).await;
        }

        tracing::info!(user_sso_id, item_id, quantity, "cart item quantity updated");
        Ok(())
    }

    pub async fn remove(&self, user_sso_id: i64, item_id: &str) -> Result<(), ServiceError> {
        self.store
            .remove_item(user_sso_id, item_id)
            .await
            .map_err(|err| err.context("cart.remove"))?;

        if let Err(err) = self.cache.remove_item(user_sso_id, item_id).await {
            self.compensate(user_sso_id, &err).await;
        }

        tracing::info!(user_sso_id, item_id, "item removed from cart");
        Ok(())
    }

    /// Truncates the cart; the cache entry is dropped wholesale rather
    /// than surgically emptied.
    pub async fn clear(&self, user_sso_id: i64) -> Result<(), ServiceError> {
        self.store
            .clear(user_sso_id)
            .await
            .map_err(|err| err.context("cart.clear"))?;

        if let Err(err) = self.cache.invalidate(user_sso_id).await {
            tracing::warn!(user_sso_id, error = %err, "failed to invalidate cart cache");
        }

        tracing::info!(user_sso_id, "cart cleared");
        Ok(())
    }
}
