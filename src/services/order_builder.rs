use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::{Order, OrderLineItem, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{CheckoutSource, OrderNumber, OrderableLine};
use crate::repositories::{OrderFilter, OrderPatch, OrderStore, StoreError};

/// Input to [`OrderBuilder::build_order`].
#[derive(Debug, Clone)]
pub struct BuildOrderRequest {
    pub guardian_id: Uuid,
    pub source: CheckoutSource,
    /// Reusing a number makes the call idempotent; `None` generates one.
    pub order_number: Option<OrderNumber>,
    pub lines: Vec<OrderableLine>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order: Order,
    pub line_items: Vec<OrderLineItem>,
    /// True when the call resolved to an order created by an earlier attempt.
    pub resumed: bool,
}

/// Turns orderable lines into a persisted header plus line items.
#[derive(Clone)]
pub struct OrderBuilder {
    store: Arc<dyn OrderStore>,
    event_sender: Arc<EventSender>,
    currency: String,
    order_number_attempts: u32,
}

impl OrderBuilder {
    pub fn new(
        store: Arc<dyn OrderStore>,
        event_sender: Arc<EventSender>,
        currency: impl Into<String>,
        order_number_attempts: u32,
    ) -> Self {
        Self {
            store,
            event_sender,
            currency: currency.into(),
            order_number_attempts: order_number_attempts.max(1),
        }
    }

    #[instrument(skip(self, request), fields(guardian_id = %request.guardian_id, source = request.source.as_str()))]
    pub async fn build_order(&self, request: BuildOrderRequest) -> Result<PlacedOrder, ServiceError> {
        validate_lines(&request.lines)?;

        let total_amount: Decimal = request.lines.iter().map(OrderableLine::line_total).sum();
        let (child_name, child_class) = child_summary(&request.lines);

        let mut number = request
            .order_number
            .clone()
            .unwrap_or_else(|| OrderNumber::generate(request.source));
        let mut attempt = 1;

        let (order, resumed) = loop {
            let header = self.header(&request, &number, total_amount, &child_name, &child_class);
            match self.store.insert_order(header).await {
                Ok(order) => break (order, false),
                Err(StoreError::DuplicateKey(key)) => {
                    if let Some(existing) = self.same_checkout(&number, &request, total_amount).await? {
                        warn!(
                            order_id = %existing.id,
                            order_number = %number,
                            "Order number already recorded for this checkout; resuming it"
                        );
                        break (existing, true);
                    }
                    if attempt >= self.order_number_attempts {
                        error!(%key, attempts = attempt, "Could not allocate a unique order number");
                        return Err(ServiceError::Conflict(format!(
                            "no free order number after {} attempts",
                            attempt
                        )));
                    }
                    warn!(%key, "Order number collision; generating a new one");
                    number = OrderNumber::generate(request.source);
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if resumed {
            let existing_items = self.store.line_items(order.id).await?;
            if !existing_items.is_empty() {
                return Ok(PlacedOrder {
                    order,
                    line_items: existing_items,
                    resumed,
                });
            }
        }

        let items = line_items_for(&order, &request.lines)?;
        let line_items = match self.store.insert_line_items(items).await {
            Ok(line_items) => line_items,
            Err(e) => {
                error!(
                    order_id = %order.id,
                    error = %e,
                    "Line items failed after the order header was written"
                );
                if let Err(void_err) = self.void_order(order.id, "line items not recorded").await {
                    error!(
                        order_id = %order.id,
                        error = %void_err,
                        "Could not void half-written order; left for the orphan sweep"
                    );
                }
                return Err(ServiceError::PartialOrder { order_id: order.id });
            }
        };

        if !resumed {
            counter!(
                "checkout_orders_created_total",
                1,
                "source" => request.source.as_str().to_string()
            );
        }
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            lines = line_items.len(),
            "Order recorded"
        );
        self.event_sender
            .emit(Event::OrderCreated {
                order_id: order.id,
                order_number: order.order_number.clone(),
                source: request.source,
            })
            .await;

        Ok(PlacedOrder {
            order,
            line_items,
            resumed,
        })
    }

    /// Forces an unpaid order to `cancelled`.
    #[instrument(skip(self))]
    pub async fn void_order(&self, order_id: Uuid, reason: &str) -> Result<Order, ServiceError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is paid and cannot be voided",
                order_id
            )));
        }
        if order.status == OrderStatus::Cancelled {
            return Ok(order);
        }

        let voided = self
            .store
            .update_order(order_id, OrderPatch::status(OrderStatus::Cancelled))
            .await?;
        counter!("checkout_orders_voided_total", 1);
        warn!(order_number = %voided.order_number, reason, "Order voided");
        self.event_sender
            .emit(Event::OrderVoided {
                order_id,
                reason: reason.to_string(),
            })
            .await;
        Ok(voided)
    }

    /// Voids unpaid orders created before `older_than` that never got line
    /// items or a payment session. Returns the ids voided.
    #[instrument(skip(self))]
    pub async fn void_orphaned_orders(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, ServiceError> {
        let filter = OrderFilter {
            status: Some(OrderStatus::Pending),
            payment_status: Some(PaymentStatus::Pending),
            created_before: Some(older_than),
            ..Default::default()
        };

        let mut voided = Vec::new();
        for order in self.store.list_orders(&filter).await? {
            let orphaned = !order.has_session() || self.store.line_items(order.id).await?.is_empty();
            if !orphaned {
                continue;
            }
            match self.void_order(order.id, "abandoned before payment").await {
                Ok(_) => voided.push(order.id),
                Err(e) => warn!(order_id = %order.id, error = %e, "Orphan sweep could not void order"),
            }
        }

        if !voided.is_empty() {
            info!(count = voided.len(), "Orphan sweep voided orders");
        }
        Ok(voided)
    }

    /// The existing order under `number` when it is a replay of this checkout.
    async fn same_checkout(
        &self,
        number: &OrderNumber,
        request: &BuildOrderRequest,
        total_amount: Decimal,
    ) -> Result<Option<Order>, ServiceError> {
        let existing = self.store.find_order_by_number(number.as_str()).await?;
        Ok(existing.filter(|order| {
            order.guardian_id == request.guardian_id
                && order.total_amount == total_amount
                && order.status != OrderStatus::Cancelled
        }))
    }

    fn header(
        &self,
        request: &BuildOrderRequest,
        number: &OrderNumber,
        total_amount: Decimal,
        child_name: &str,
        child_class: &str,
    ) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            order_number: number.to_string(),
            gateway_order_id: number.to_string(),
            guardian_id: request.guardian_id,
            child_name: child_name.to_string(),
            child_class: child_class.to_string(),
            total_amount,
            currency: self.currency.clone(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            session_token: None,
            notes: request.notes.clone().filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: now,
        }
    }
}

fn validate_lines(lines: &[OrderableLine]) -> Result<(), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::EmptyCart);
    }
    for line in lines {
        if line.child_id.is_nil() {
            return Err(ServiceError::ValidationError(format!(
                "line for {} has no child",
                line.menu_item_name
            )));
        }
        if line.quantity == 0 {
            return Err(ServiceError::ValidationError(format!(
                "line for {} has zero quantity",
                line.menu_item_name
            )));
        }
        if i32::try_from(line.quantity).is_err() {
            return Err(ServiceError::ValidationError(format!(
                "line for {} has quantity {} above the storable maximum",
                line.menu_item_name, line.quantity
            )));
        }
        if line.unit_price.is_sign_negative() {
            return Err(ServiceError::ValidationError(format!(
                "line for {} has a negative price",
                line.menu_item_name
            )));
        }
    }
    Ok(())
}

/// Order-level child name and class, for display only.
pub fn child_summary(lines: &[OrderableLine]) -> (String, String) {
    let mut distinct: Vec<&OrderableLine> = Vec::new();
    for line in lines {
        if !distinct.iter().any(|seen| seen.child_id == line.child_id) {
            distinct.push(line);
        }
    }

    match distinct.as_slice() {
        [only] => (
            only.child_name.clone(),
            only.child_class.clone().unwrap_or_default(),
        ),
        many => (format!("{} children", many.len()), "Multiple".to_string()),
    }
}

fn line_items_for(
    order: &Order,
    lines: &[OrderableLine],
) -> Result<Vec<OrderLineItem>, ServiceError> {
    let order_date = order.created_at.date_naive();
    lines
        .iter()
        .map(|line| {
            let quantity = i32::try_from(line.quantity).map_err(|_| {
                ServiceError::ValidationError(format!(
                    "line for {} has quantity {} above the storable maximum",
                    line.menu_item_name, line.quantity
                ))
            })?;
            Ok(OrderLineItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                child_id: line.child_id,
                child_name: line.child_name.clone(),
                child_class: line.child_class.clone(),
                menu_item_id: line.menu_item_id,
                menu_item_name: line.menu_item_name.clone(),
                quantity,
                unit_price: line.unit_price,
                total_price: line.line_total(),
                delivery_date: line.delivery_date,
                order_date,
                created_at: order.created_at,
            })
        })
        .collect()
}
