use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::ServiceError;
use crate::models::{NewOrderItem, Order, OrderItem, OrderStatus, OrderWithItems};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts the order and all its items in one transaction.
    async fn create(
        &self,
        user_id: i64,
        total_amount: i64,
        items: &[NewOrderItem],
    ) -> Result<OrderWithItems, ServiceError>;
    async fn get(&self, order_id: i64) -> Result<OrderWithItems, ServiceError>;
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<OrderWithItems>, ServiceError>;
    /// Moves the order to `status` only when its current status is one of
    /// `allowed_from`; returns whether a row changed.
    async fn transition_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        allowed_from: &[OrderStatus],
    ) -> Result<bool, ServiceError>;
    async fn update_payment_url(&self, order_id: i64, payment_url: &str)
        -> Result<(), ServiceError>;
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    status: String,
    total_amount: i64,
    payment_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self) -> Result<Order, ServiceError> {
        let status = OrderStatus::parse(&self.status).ok_or_else(|| {
            ServiceError::internal(format!("order {} has unknown status {}", self.id, self.status))
        })?;
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            status,
            total_amount: self.total_amount,
            payment_url: self.payment_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ORDER_COLUMNS: &str =
    "id, user_id, status, total_amount, payment_url, created_at, updated_at";

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn items_of(&self, order_id: i64) -> Result<Vec<OrderItem>, ServiceError> {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, sneaker_id, quantity, price_at_purchase, created_at
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(
        &self,
        user_id: i64,
        total_amount: i64,
        items: &[NewOrderItem],
    ) -> Result<OrderWithItems, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let order_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (user_id, status, total_amount)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(OrderStatus::PendingPayment.as_str())
        .bind(total_amount)
        .fetch_one(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, sneaker_id, quantity, price_at_purchase)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(order_id)
            .bind(item.sneaker_id)
            .bind(item.quantity)
            .bind(item.price_at_purchase)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        self.get(order_id).await
    }

    async fn get(&self, order_id: i64) -> Result<OrderWithItems, ServiceError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("order {order_id} not found")))?;

        let order = row.into_order()?;
        let items = self.items_of(order_id).await?;

        Ok(OrderWithItems { order, items })
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<OrderWithItems>, ServiceError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order = row.into_order()?;
            let items = self.items_of(order.id).await?;
            orders.push(OrderWithItems { order, items });
        }
        Ok(orders)
    }

    async fn transition_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        allowed_from: &[OrderStatus],
    ) -> Result<bool, ServiceError> {
        let allowed: Vec<String> = allowed_from
            .iter()
            .map(|from| from.as_str().to_string())
            .collect();

        let result = sqlx::query(
            r#"
            UPDATE orders SET status = $2, updated_at = now()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(order_id)
        .bind(status.as_str())
        .bind(&allowed)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_payment_url(
        &self,
        order_id: i64,
        payment_url: &str,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET payment_url = $2, updated_at = now() WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(payment_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound(format!("order {order_id} not found")));
        }
        Ok(())
    }
}
