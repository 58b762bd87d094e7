//! Ports to the persistent store and their implementations.
//!
//! The checkout flow only assumes that each insert is atomic per table. Header
//! and line-item writes are separate calls so that every implementation,
//! transactional or not, goes through the same compensating path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::{Order, OrderLineItem, OrderStatus, PaymentStatus};
use crate::models::Child;

pub mod child_directory;
pub mod memory;
pub mod order_repository;

pub use child_directory::SeaOrmChildDirectory;
pub use memory::{InMemoryChildDirectory, InMemoryOrderStore};
pub use order_repository::SeaOrmOrderStore;

#[derive(Debug, Clone, Error, Serialize)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    Database(String),
}

/// Fields of an order header that may change after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub session_token: Option<String>,
}

impl OrderPatch {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn payment_status(payment_status: PaymentStatus) -> Self {
        Self {
            payment_status: Some(payment_status),
            ..Default::default()
        }
    }

    pub fn session_token(token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub guardian_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub created_before: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn for_guardian(guardian_id: Uuid) -> Self {
        Self {
            guardian_id: Some(guardian_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, order: &Order) -> bool {
        self.guardian_id.map_or(true, |g| order.guardian_id == g)
            && self.status.map_or(true, |s| order.status == s)
            && self.payment_status.map_or(true, |p| order.payment_status == p)
            && self.created_before.map_or(true, |t| order.created_at < t)
    }
}

/// Order header and line-item tables.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: Order) -> Result<Order, StoreError>;

    /// Inserts all rows in one statement; either every row lands or none.
    async fn insert_line_items(
        &self,
        items: Vec<OrderLineItem>,
    ) -> Result<Vec<OrderLineItem>, StoreError>;

    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> Result<Order, StoreError>;

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError>;

    async fn find_order_by_gateway_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, StoreError>;

    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    async fn line_items(&self, order_id: Uuid) -> Result<Vec<OrderLineItem>, StoreError>;
}

/// Read-only source of a guardian's children.
#[async_trait]
pub trait ChildDirectory: Send + Sync {
    async fn children_for_guardian(&self, guardian_id: Uuid) -> Result<Vec<Child>, StoreError>;
}
