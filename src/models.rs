use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sneaker {
    pub id: i64,
    pub title: String,
    /// Price in minor currency units.
    pub price: i64,
    pub image_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub user_sso_id: i64,
    pub items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn empty(user_sso_id: i64) -> Self {
        Self {
            user_sso_id,
            items: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// A single cart position. `id` is opaque to clients: row-store items carry
/// a stringified sequence number, cache-only items a generated key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub user_sso_id: i64,
    pub sneaker_id: i64,
    pub quantity: i32,
    pub added_at: DateTime<Utc>,
    /// Whether the cache copy is known to match the row store.
    pub synchronized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Cancelled,
    Shipped,
    PaymentFailed,
}

impl OrderStatus {
    pub const ALL: [Self; 5] = [
        Self::PendingPayment,
        Self::Paid,
        Self::Cancelled,
        Self::Shipped,
        Self::PaymentFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
            Self::Shipped => "SHIPPED",
            Self::PaymentFailed => "PAYMENT_FAILED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == raw)
    }

    /// Reachability per the order lifecycle: payment events drive an order
    /// out of `PENDING_PAYMENT`, `PAID` can ship, cancellation is manual
    /// from any non-terminal state. Re-applying the current status is
    /// allowed so event redelivery stays idempotent.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::PendingPayment, Self::Paid)
                | (Self::PendingPayment, Self::PaymentFailed)
                | (Self::PendingPayment, Self::Cancelled)
                | (Self::Paid, Self::Shipped)
                | (Self::Paid, Self::Cancelled)
        )
    }

    /// All statuses from which `next` is reachable, `next` itself included.
    pub fn sources(next: Self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|status| status.can_transition_to(next))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub status: OrderStatus,
    /// Sum of `price_at_purchase * quantity` over the order items.
    pub total_amount: i64,
    pub payment_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub sneaker_id: i64,
    pub quantity: i32,
    /// Snapshot taken at order creation, immutable afterwards.
    pub price_at_purchase: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

/// Input for order creation, already enriched with the price snapshot.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub sneaker_id: i64,
    pub quantity: i32,
    pub price_at_purchase: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Canceled,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "succeeded" => Some(Self::Succeeded),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Provider statuses other than the two terminal ones stay pending.
    pub fn from_provider(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(Self::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    /// Identifier assigned by the payment provider.
    pub external_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub confirmation_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: i64,
    pub external_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub confirmation_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favourite {
    pub id: i64,
    pub sneaker_id: i64,
}
