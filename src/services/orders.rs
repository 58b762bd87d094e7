use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::{Order, OrderLineItem, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::repositories::{OrderFilter, OrderStore};

const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    pub line_items: Vec<OrderLineItem>,
    /// Whether the guardian can reopen payment for this order.
    pub can_resume_payment: bool,
}

impl OrderDetail {
    pub fn line_total(&self) -> Decimal {
        self.line_items.iter().map(|i| i.total_price).sum()
    }
}

/// Read side of a guardian's orders.
#[derive(Clone)]
pub struct OrderHistoryService {
    store: Arc<dyn OrderStore>,
}

impl OrderHistoryService {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Newest first, optionally narrowed by either status axis.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        guardian_id: Uuid,
        query: &OrderQuery,
    ) -> Result<OrderListResponse, ServiceError> {
        let filter = OrderFilter {
            status: query.status,
            payment_status: query.payment_status,
            ..OrderFilter::for_guardian(guardian_id)
        };
        let orders = self.store.list_orders(&filter).await?;

        let per_page = query.per_page.unwrap_or(20).clamp(1, MAX_PER_PAGE);
        let page = query.page.unwrap_or(1).max(1);
        let total = orders.len() as u64;
        let orders = orders
            .into_iter()
            .skip(((page - 1) * per_page) as usize)
            .take(per_page as usize)
            .collect();

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    #[instrument(skip(self))]
    pub async fn order_detail(
        &self,
        guardian_id: Uuid,
        order_id: Uuid,
    ) -> Result<OrderDetail, ServiceError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .filter(|o| o.guardian_id == guardian_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let line_items = self.store.line_items(order.id).await?;
        let can_resume_payment = order.status != OrderStatus::Cancelled
            && order.payment_status == PaymentStatus::Pending
            && !line_items.is_empty();

        Ok(OrderDetail {
            order,
            line_items,
            can_resume_payment,
        })
    }
}
