//! Database entities backing the checkout flow.

pub mod child;
pub mod order;
pub mod order_line_item;

pub use order::{OrderStatus, PaymentStatus};

/// Persisted order header.
pub type Order = order::Model;
/// Persisted order line item.
pub type OrderLineItem = order_line_item::Model;
