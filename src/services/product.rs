//! Product catalog with a two-level read-through cache.
//!
//! L1 keys a single product, L2 a list slice by limit/offset. Writes
//! invalidate point keys; the canonical first page is the only list slice
//! invalidated on catalog changes, other slices age out via TTL. Cache
//! failures are logged and never mask a row-store result.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::cache::{self, keys, CacheStore};
use crate::error::ServiceError;
use crate::filestore::FileStore;
use crate::models::Sneaker;
use crate::repo::ProductStore;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub struct ProductService {
    store: Arc<dyn ProductStore>,
    cache: Arc<dyn CacheStore>,
    files: Arc<dyn FileStore>,
    cache_ttl: Duration,
}

impl ProductService {
    pub fn new(
        store: Arc<dyn ProductStore>,
        cache: Arc<dyn CacheStore>,
        files: Arc<dyn FileStore>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            files,
            cache_ttl,
        }
    }

    /// The one list key invalidated on catalog writes.
    fn canonical_list_key() -> String {
        keys::product_list(DEFAULT_PAGE_SIZE, 0)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Sneaker, ServiceError> {
        let key = keys::product(id);
        match cache::get_json::<Sneaker>(self.cache.as_ref(), &key).await {
            Ok(Some(sneaker)) => {
                tracing::debug!(id, "product cache hit");
                return Ok(sneaker);
            }
            Ok(None) => tracing::debug!(id, "product cache miss"),
            Err(err) => tracing::warn!(id, error = %err, "failed to read product cache"),
        }

        let sneaker = self
            .store
            .get(id)
            .await
            .map_err(|err| err.context("product.get_by_id"))?;

        if let Err(err) =
            cache::set_json(self.cache.as_ref(), &key, &sneaker, self.cache_ttl).await
        {
            tracing::warn!(id, error = %err, "failed to cache product");
        }

        Ok(sneaker)
    }

    pub async fn get_all(&self, limit: i64, offset: i64) -> Result<Vec<Sneaker>, ServiceError> {
        let limit = if limit <= 0 || limit > MAX_PAGE_SIZE {
            DEFAULT_PAGE_SIZE
        } else {
            limit
        };
        let offset = offset.max(0);

        let key = keys::product_list(limit, offset);
        match cache::get_json::<Vec<Sneaker>>(self.cache.as_ref(), &key).await {
            Ok(Some(sneakers)) => {
                tracing::debug!(limit, offset, "product list cache hit");
                return Ok(sneakers);
            }
            Ok(None) => tracing::debug!(limit, offset, "product list cache miss"),
            Err(err) => tracing::warn!(error = %err, "failed to read product list cache"),
        }

        let sneakers = self
            .store
            .list(limit, offset)
            .await
            .map_err(|err| err.context("product.get_all"))?;

        // List slices live half as long as single entries.
        if !sneakers.is_empty() {
            if let Err(err) =
                cache::set_json(self.cache.as_ref(), &key, &sneakers, self.cache_ttl / 2).await
            {
                tracing::warn!(error = %err, "failed to cache product list");
            }
        }

        Ok(sneakers)
    }

    /// Bulk lookups bypass both cache tiers.
    pub async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Sneaker>, ServiceError> {
        self.store
            .get_many(ids)
            .await
            .map_err(|err| err.context("product.get_by_ids"))
    }

    pub async fn add(&self, title: &str, price: i64) -> Result<Sneaker, ServiceError> {
        if title.is_empty() {
            return Err(ServiceError::Validation("title is required".to_string()));
        }
        if price <= 0 {
            return Err(ServiceError::Validation("price must be positive".to_string()));
        }

        let id = self
            .store
            .insert(title, price)
            .await
            .map_err(|err| err.context("product.add"))?;
        tracing::info!(id, "sneaker added");

        if let Err(err) = self.cache.delete(&Self::canonical_list_key()).await {
            tracing::warn!(error = %err, "failed to invalidate product list cache");
        }

        Ok(Sneaker {
            id,
            title: title.to_string(),
            price,
            image_key: String::new(),
        })
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        self.store
            .delete(id)
            .await
            .map_err(|err| err.context("product.delete"))?;
        tracing::info!(id, "sneaker deleted");

        if let Err(err) = self.cache.delete(&keys::product(id)).await {
            tracing::warn!(id, error = %err, "failed to invalidate product cache");
        }
        if let Err(err) = self.cache.delete(&Self::canonical_list_key()).await {
            tracing::warn!(error = %err, "failed to invalidate product list cache");
        }

        Ok(())
    }

    pub async fn update_image(&self, id: i64, image_key: &str) -> Result<(), ServiceError> {
        self.store
            .set_image_key(id, image_key)
            .await
            .map_err(|err| err.context("product.update_image"))?;

        if let Err(err) = self.cache.delete(&keys::product(id)).await {
            tracing::warn!(id, error = %err, "failed to invalidate product cache");
        }

        tracing::info!(id, image_key, "product image updated");
        Ok(())
    }

    /// Mints a fresh object key under `products/` and a presigned URL the
    /// client uploads to. The key becomes meaningful once bound to a
    /// product via [`Self::update_image`].
    pub async fn generate_upload_url(
        &self,
        original_filename: &str,
        content_type: &str,
    ) -> Result<(String, String), ServiceError> {
        let ext = Path::new(original_filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let key = format!("products/{}{}", Uuid::new_v4(), ext);

        tracing::info!(key = %key, "generating upload url");
        let url = self
            .files
            .presign_put(&key, content_type)
            .await
            .map_err(|err| err.context("product.generate_upload_url"))?;

        Ok((url, key))
    }
}
