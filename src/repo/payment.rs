use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::ServiceError;
use crate::models::{NewPayment, Payment, PaymentStatus};

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts the payment unless the order already has one; returns
    /// whether a new row was written. Orders and payments are 1:1, so a
    /// redelivered creation is a no-op, not a conflict.
    async fn insert(&self, payment: &NewPayment) -> Result<bool, ServiceError>;
    async fn update_status_by_external_id(
        &self,
        external_id: &str,
        status: PaymentStatus,
    ) -> Result<(), ServiceError>;
    async fn get_by_external_id(&self, external_id: &str) -> Result<Payment, ServiceError>;
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    order_id: i64,
    external_id: String,
    amount: i64,
    currency: String,
    status: String,
    confirmation_url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> Result<Payment, ServiceError> {
        let status = PaymentStatus::parse(&self.status).ok_or_else(|| {
            ServiceError::internal(format!(
                "payment {} has unknown status {}",
                self.id, self.status
            ))
        })?;
        Ok(Payment {
            id: self.id,
            order_id: self.order_id,
            external_id: self.external_id,
            amount: self.amount,
            currency: self.currency,
            status,
            confirmation_url: self.confirmation_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert(&self, payment: &NewPayment) -> Result<bool, ServiceError> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO payments (order_id, external_id, amount, currency, status, confirmation_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(payment.order_id)
        .bind(&payment.external_id)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(&payment.confirmation_url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(id.is_some())
    }

    async fn update_status_by_external_id(
        &self,
        external_id: &str,
        status: PaymentStatus,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE payments SET status = $2, updated_at = now() WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound(format!(
                "payment {external_id} not found"
            )));
        }
        Ok(())
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Payment, ServiceError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, order_id, external_id, amount, currency, status, confirmation_url,
                   created_at, updated_at
            FROM payments
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("payment {external_id} not found")))?;

        row.into_payment()
    }
}
