//! In-memory domain types used before and around persistence.

pub mod batch;
pub mod cart;
pub mod checkout;
pub mod child;
pub mod order_number;

pub use batch::BatchEntry;
pub use cart::{CartLine, LineId, MenuItem};
pub use checkout::{flatten_batch, CustomerDetails, Guardian, OrderableLine};
pub use child::Child;
pub use order_number::{CheckoutSource, OrderNumber};
