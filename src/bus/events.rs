//! Event payloads exchanged between the order and payment cores.
//!
//! All events about one order share the `order-{id}` / `payment-{order_id}`
//! key so they land on a single partition and keep their relative order.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const ORDER_CREATED_TYPE: &str = "OrderCreated";
pub const PAYMENT_PROCESSED_TYPE: &str = "PaymentProcessed";

pub const STATUS_SUCCESS: &str = "SUCCESS";
pub const STATUS_FAILURE: &str = "FAILURE";
pub const STATUS_PENDING: &str = "PENDING";

pub fn order_key(order_id: i64) -> String {
    format!("order-{order_id}")
}

pub fn payment_key(order_id: i64) -> String {
    format!("payment-{order_id}")
}

fn rfc3339_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreated {
    pub event_type: String,
    pub order_id: i64,
    pub user_id: i64,
    pub total_amount: i64,
    pub timestamp: String,
}

impl OrderCreated {
    pub fn new(order_id: i64, user_id: i64, total_amount: i64) -> Self {
        Self {
            event_type: ORDER_CREATED_TYPE.to_string(),
            order_id,
            user_id,
            total_amount,
            timestamp: rfc3339_now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentProcessed {
    pub event_type: String,
    pub order_id: i64,
    /// `SUCCESS`, `FAILURE` or `PENDING`.
    pub status: String,
    pub payment_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payment_url: String,
    pub timestamp: String,
}

impl PaymentProcessed {
    pub fn new(order_id: i64, status: &str, payment_id: &str, payment_url: &str) -> Self {
        Self {
            event_type: PAYMENT_PROCESSED_TYPE.to_string(),
            order_id,
            status: status.to_string(),
            payment_id: payment_id.to_string(),
            payment_url: payment_url.to_string(),
            timestamp: rfc3339_now(),
        }
    }
}
