use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::ServiceError;
use crate::models::{Cart, CartItem};

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns an empty cart for users that never had one.
    async fn get_cart(&self, user_sso_id: i64) -> Result<Cart, ServiceError>;
    async fn add_item(
        &self,
        user_sso_id: i64,
        sneaker_id: i64,
        quantity: i32,
        added_at: DateTime<Utc>,
    ) -> Result<CartItem, ServiceError>;
    async fn update_quantity(
        &self,
        user_sso_id: i64,
        item_id: &str,
        quantity: i32,
    ) -> Result<(), ServiceError>;
    async fn remove_item(&self, user_sso_id: i64, item_id: &str) -> Result<(), ServiceError>;
    async fn clear(&self, user_sso_id: i64) -> Result<(), ServiceError>;
}

/// Row-store item ids are sequence numbers; clients see them stringified.
fn parse_item_id(item_id: &str) -> Result<i64, ServiceError> {
    item_id
        .parse::<i64>()
        .map_err(|_| ServiceError::Validation(format!("malformed item id: {item_id}")))
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    id: i64,
    sneaker_id: i64,
    quantity: i32,
    added_at: DateTime<Utc>,
}

pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn get_cart(&self, user_sso_id: i64) -> Result<Cart, ServiceError> {
        let updated_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT updated_at FROM carts WHERE user_sso_id = $1")
                .bind(user_sso_id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(updated_at) = updated_at else {
            return Ok(Cart::empty(user_sso_id));
        };

        let rows = sqlx::query_as::<_, CartItemRow>(
            r#"
            SELECT id, sneaker_id, quantity, added_at
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY id
            "#,
        )
        .bind(user_sso_id)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(|row| CartItem {
                id: row.id.to_string(),
                user_sso_id,
                sneaker_id: row.sneaker_id,
                quantity: row.quantity,
                added_at: row.added_at,
                synchronized: true,
            })
            .collect();

        Ok(Cart {
            user_sso_id,
            items,
            updated_at,
        })
    }

    async fn add_item(
        &self,
        user_sso_id: i64,
        sneaker_id: i64,
        quantity: i32,
        added_at: DateTime<Utc>,
    ) -> Result<CartItem, ServiceError> {
        let mut tx = self.pool.begin().await?;

        // Implicitly create the cart on first insert and advance its clock.
        sqlx::query(
            r#"
            INSERT INTO carts (user_sso_id, updated_at)
            VALUES ($1, now())
            ON CONFLICT (user_sso_id)
            DO UPDATE SET updated_at = now()
            "#,
        )
        .bind(user_sso_id)
        .execute(&mut *tx)
        .await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO cart_items (cart_id, sneaker_id, quantity, added_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(user_sso_id)
        .bind(sneaker_id)
        .bind(quantity)
        .bind(added_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(CartItem {
            id: id.to_string(),
            user_sso_id,
            sneaker_id,
            quantity,
            added_at,
            synchronized: true,
        })
    }

    async fn update_quantity(
        &self,
        user_sso_id: i64,
        item_id: &str,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let id = parse_item_id(item_id)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE cart_items SET quantity = $3, updated_at = now()
            WHERE cart_id = $1 AND id = $2
            "#,
        )
        .bind(user_sso_id)
        .bind(id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound(format!("cart item {item_id} not found")));
        }

        sqlx::query("UPDATE carts SET updated_at = now() WHERE user_sso_id = $1")
            .bind(user_sso_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_item(&self, user_sso_id: i64, item_id: &str) -> Result<(), ServiceError> {
        let id = parse_item_id(item_id)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND id = $2")
            .bind(user_sso_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound(format!("cart item {item_id} not found")));
        }

        sqlx::query("UPDATE carts SET updated_at = now() WHERE user_sso_id = $1")
            .bind(user_sso_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn clear(&self, user_sso_id: i64) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(user_sso_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE carts SET updated_at = now() WHERE user_sso_id = $1")
            .bind(user_sso_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
