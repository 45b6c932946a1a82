//! HTTP client for the YooKassa payment provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::ServiceError;

/// Result of creating a payment with the remote provider.
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub external_id: String,
    pub status: String,
    pub confirmation_url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_payment(
        &self,
        amount: i64,
        currency: &str,
        description: &str,
        idempotence_key: &str,
    ) -> Result<CreatedPayment, ServiceError>;
}

#[derive(Debug, Serialize)]
struct PaymentRequest {
    amount: Amount,
    capture: bool,
    confirmation: RequestConfirmation,
    description: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Amount {
    value: String,
    currency: String,
}

#[derive(Debug, Serialize)]
struct RequestConfirmation {
    #[serde(rename = "type")]
    kind: String,
    return_url: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    status: String,
    #[serde(default)]
    confirmation: Option<ResponseConfirmation>,
}

#[derive(Debug, Deserialize)]
struct ResponseConfirmation {
    #[serde(default)]
    confirmation_url: String,
}

/// Amounts travel through the system in minor units; the provider API
/// wants decimal major units.
const MINOR_UNITS_PER_MAJOR: f64 = 100.0;

fn format_amount(minor_units: i64) -> String {
    format!("{:.2}", minor_units as f64 / MINOR_UNITS_PER_MAJOR)
}

pub struct YooKassaProvider {
    shop_id: String,
    secret_key: String,
    return_url: String,
    base_url: String,
    client: reqwest::Client,
}

impl YooKassaProvider {
    pub fn new(cfg: &ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            shop_id: cfg.shop_id.clone(),
            secret_key: cfg.secret_key.clone(),
            return_url: cfg.return_url.clone(),
            base_url: cfg.base_url.clone(),
            client,
        }
    }
}

#[async_trait]
impl PaymentProvider for YooKassaProvider {
    async fn create_payment(
        &self,
        amount: i64,
        currency: &str,
        description: &str,
        idempotence_key: &str,
    ) -> Result<CreatedPayment, ServiceError> {
        let body = PaymentRequest {
            amount: Amount {
                value: format_amount(amount),
                currency: currency.to_string(),
            },
            capture: true,
            confirmation: RequestConfirmation {
                kind: "redirect".to_string(),
                return_url: self.return_url.clone(),
            },
            description: description.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/payments", self.base_url))
            .basic_auth(&self.shop_id, Some(&self.secret_key))
            .header("Idempotence-Key", idempotence_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                ServiceError::Unavailable(format!("failed to reach payment provider: {err}"))
            })?;

        if response.status().as_u16() >= 400 {
            return Err(ServiceError::Unavailable(format!(
                "payment provider error: status {}",
                response.status().as_u16()
            )));
        }

        let payment: PaymentResponse = response.json().await.map_err(|err| {
            ServiceError::internal(format!("failed to decode provider response: {err}"))
        })?;

        tracing::info!(
            payment_id = %payment.id,
            status = %payment.status,
            "payment created with provider"
        );

        Ok(CreatedPayment {
            external_id: payment.id,
            status: payment.status,
            confirmation_url: payment
                .confirmation
                .map(|confirmation| confirmation.confirmation_url)
                .unwrap_or_default(),
        })
    }
}
