//! Row-store access. Every multi-row mutation runs inside a transaction;
//! callers publish events only after the transaction committed.

pub mod cart;
pub mod order;
pub mod payment;
pub mod product;

pub use cart::{CartStore, PgCartStore};
pub use order::{OrderStore, PgOrderStore};
pub use payment::{PaymentStore, PgPaymentStore};
pub use product::{PgProductStore, ProductStore};
