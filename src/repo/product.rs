use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::ServiceError;
use crate::models::Sneaker;

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert(&self, title: &str, price: i64) -> Result<i64, ServiceError>;
    async fn get(&self, id: i64) -> Result<Sneaker, ServiceError>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Sneaker>, ServiceError>;
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Sneaker>, ServiceError>;
    async fn delete(&self, id: i64) -> Result<(), ServiceError>;
    async fn set_image_key(&self, id: i64, image_key: &str) -> Result<(), ServiceError>;
}

pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductStore for PgProductStore {
    async fn insert(&self, title: &str, price: i64) -> Result<i64, ServiceError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sneakers (title, price)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(title)
        .bind(price)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Sneaker, ServiceError> {
        let sneaker = sqlx::query_as::<_, Sneaker>(
            r#"
            SELECT id, title, price, image_key FROM sneakers WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("sneaker {id} not found")))?;

        Ok(sneaker)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Sneaker>, ServiceError> {
        let sneakers = sqlx::query_as::<_, Sneaker>(
            r#"
            SELECT id, title, price, image_key FROM sneakers
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(sneakers)
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Sneaker>, ServiceError> {
        let sneakers = sqlx::query_as::<_, Sneaker>(
            r#"
            SELECT id, title, price, image_key FROM sneakers
            WHERE id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(sneakers)
    }

    async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM sneakers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound(format!("sneaker {id} not found")));
        }
        Ok(())
    }

    async fn set_image_key(&self, id: i64, image_key: &str) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE sneakers SET image_key = $2, updated_at = now() WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(image_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound(format!("sneaker {id} not found")));
        }
        Ok(())
    }
}
