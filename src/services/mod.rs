//! Checkout and payment orchestration.
//!
//! Control flows cart → (batch) → order builder → payment session → widget →
//! reconciler, with [`checkout::CheckoutSession`] driving one guardian through
//! it.

pub mod batch;
pub mod cart;
pub mod checkout;
pub mod children;
pub mod order_builder;
pub mod orders;
pub mod payment_session;
pub mod reconciler;

pub use batch::BatchAggregator;
pub use cart::CartStore;
pub use checkout::{CheckoutReport, CheckoutServices, CheckoutSession};
pub use children::ChildResolver;
pub use order_builder::{BuildOrderRequest, OrderBuilder, PlacedOrder};
pub use orders::{OrderDetail, OrderHistoryService, OrderListResponse, OrderQuery};
pub use payment_session::{OpenedSession, PaymentSessionManager};
pub use reconciler::{PaymentEvent, PaymentReconciler, ReconcileOutcome};
