pub mod cart;
pub mod order;
pub mod payment;
pub mod product;

pub use cart::CartService;
pub use order::OrderService;
pub use payment::PaymentService;
pub use product::ProductService;
