use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::batch::BatchAggregator;
use super::cart::CartStore;
use super::children::ChildResolver;
use super::order_builder::{BuildOrderRequest, OrderBuilder};
use super::payment_session::{OpenedSession, PaymentSessionManager};
use super::reconciler::{PaymentReconciler, ReconcileOutcome};
use crate::config::AppConfig;
use crate::entities::{Order, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{GatewayCallback, PaymentGateway, WidgetRuntime};
use crate::models::{
    flatten_batch, BatchEntry, CartLine, CheckoutSource, Guardian, MenuItem, OrderNumber,
    OrderableLine,
};
use crate::notifications::{Notification, NotificationKind, Notifier};
use crate::repositories::{ChildDirectory, OrderStore};

/// Shared collaborators behind every guardian's checkout session.
#[derive(Clone)]
pub struct CheckoutServices {
    pub store: Arc<dyn OrderStore>,
    pub children: ChildResolver,
    pub orders: OrderBuilder,
    pub sessions: PaymentSessionManager,
    pub reconciler: PaymentReconciler,
    pub widgets: Arc<WidgetRuntime>,
    pub notifier: Arc<dyn Notifier>,
    pub event_sender: Arc<EventSender>,
}

impl CheckoutServices {
    /// Wires every collaborator from configuration and the injected ports.
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn OrderStore>,
        directory: Arc<dyn ChildDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        widgets: Arc<WidgetRuntime>,
        notifier: Arc<dyn Notifier>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            children: ChildResolver::new(directory),
            orders: OrderBuilder::new(
                store.clone(),
                event_sender.clone(),
                config.currency.clone(),
                config.order_number_attempts,
            ),
            sessions: PaymentSessionManager::new(
                store.clone(),
                gateway,
                event_sender.clone(),
                config.gateway_timeout(),
                config.token_persist_attempts,
            ),
            reconciler: PaymentReconciler::new(store.clone(), event_sender.clone()),
            store,
            widgets,
            notifier,
            event_sender,
        }
    }
}

/// Checkout that was started but has not reached a clearing outcome yet.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlightCheckout {
    source: CheckoutSource,
    order_number: OrderNumber,
    lines: Vec<OrderableLine>,
    order_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReport {
    pub order: Order,
    pub callback: GatewayCallback,
    pub payment_status: PaymentStatus,
    /// Whether the cart (and batch, for batch checkouts) was emptied.
    pub cleared: bool,
}

/// One guardian's working state: cart, pending batch and any checkout that
/// is waiting on a payment verdict.
pub struct CheckoutSession {
    guardian: Guardian,
    services: CheckoutServices,
    cart: CartStore,
    batch: BatchAggregator,
    in_flight: Option<InFlightCheckout>,
}

impl CheckoutSession {
    pub fn new(guardian: Guardian, services: CheckoutServices) -> Self {
        Self {
            guardian,
            services,
            cart: CartStore::new(),
            batch: BatchAggregator::new(),
            in_flight: None,
        }
    }

    pub fn guardian(&self) -> &Guardian {
        &self.guardian
    }

    pub fn cart(&self) -> &CartStore {
        &self.cart
    }

    pub fn cart_mut(&mut self) -> &mut CartStore {
        &mut self.cart
    }

    pub fn batch(&self) -> &BatchAggregator {
        &self.batch
    }

    /// Order number a retry of the current checkout will reuse, if any.
    pub fn pending_order_number(&self) -> Option<&OrderNumber> {
        self.in_flight.as_ref().map(|f| &f.order_number)
    }

    pub fn add_to_cart(
        &mut self,
        item: &MenuItem,
        child_id: Uuid,
        delivery_date: NaiveDate,
        quantity: u32,
    ) -> Result<&CartLine, ServiceError> {
        self.cart.add(item, child_id, delivery_date, quantity)
    }

    /// Moves the current cart into the batch as `child_id`'s entry.
    #[instrument(skip(self, notes), fields(guardian_id = %self.guardian.id))]
    pub async fn commit_child_cart(
        &mut self,
        child_id: Uuid,
        notes: Option<String>,
    ) -> Result<BatchEntry, ServiceError> {
        let child = self
            .services
            .children
            .resolve(self.guardian.id, child_id)
            .await?;
        let entry = self
            .batch
            .commit_child_cart(&child, &mut self.cart, notes)?
            .clone();

        info!(entry_id = %entry.id, total = %entry.computed_total, "Cart committed to batch");
        self.services
            .notifier
            .notify(Notification::new(
                self.guardian.id,
                None,
                NotificationKind::BatchEntryAdded,
                "Added to batch",
                format!("Order for {} added to the batch.", child.name),
            ))
            .await;
        Ok(entry)
    }

    pub fn remove_batch_entry(&mut self, entry_id: Uuid) -> Option<BatchEntry> {
        self.batch.remove_entry(entry_id)
    }

    /// Pays for the current cart as one order.
    #[instrument(skip(self, notes), fields(guardian_id = %self.guardian.id))]
    pub async fn checkout_now(
        &mut self,
        notes: Option<String>,
    ) -> Result<CheckoutReport, ServiceError> {
        let result = self.try_checkout_now(notes).await;
        self.report_failure(result).await
    }

    /// Pays for every batch entry as one order.
    #[instrument(skip(self), fields(guardian_id = %self.guardian.id))]
    pub async fn checkout_batch(&mut self) -> Result<CheckoutReport, ServiceError> {
        let result = self.try_checkout_batch().await;
        self.report_failure(result).await
    }

    /// Reopens payment for an unpaid order from the guardian's history.
    #[instrument(skip(self), fields(guardian_id = %self.guardian.id))]
    pub async fn resume_payment(&mut self, order_id: Uuid) -> Result<CheckoutReport, ServiceError> {
        let result = self.try_resume_payment(order_id).await;
        self.report_failure(result).await
    }

    async fn try_checkout_now(
        &mut self,
        notes: Option<String>,
    ) -> Result<CheckoutReport, ServiceError> {
        if self.cart.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let mut lines = Vec::with_capacity(self.cart.lines().len());
        for line in self.cart.lines() {
            let child = self
                .services
                .children
                .resolve(self.guardian.id, line.child_id)
                .await?;
            lines.push(OrderableLine::from_cart_line(line, &child));
        }

        self.place_and_pay(CheckoutSource::Cart, lines, notes).await
    }

    async fn try_checkout_batch(&mut self) -> Result<CheckoutReport, ServiceError> {
        if self.batch.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let lines = flatten_batch(self.batch.entries());
        let notes = batch_notes(self.batch.entries());
        self.place_and_pay(CheckoutSource::Batch, lines, Some(notes))
            .await
    }

    async fn try_resume_payment(&mut self, order_id: Uuid) -> Result<CheckoutReport, ServiceError> {
        let order = self
            .services
            .store
            .find_order(order_id)
            .await?
            .filter(|o| o.guardian_id == self.guardian.id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.status == OrderStatus::Cancelled || order.payment_status != PaymentStatus::Pending
        {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is {}/{} and cannot be paid",
                order.order_number,
                order.status.as_str(),
                order.payment_status.as_str()
            )));
        }

        let source = self
            .in_flight
            .as_ref()
            .filter(|f| f.order_id == Some(order_id))
            .map(|f| f.source);
        self.pay(order, source).await
    }

    async fn place_and_pay(
        &mut self,
        source: CheckoutSource,
        lines: Vec<OrderableLine>,
        notes: Option<String>,
    ) -> Result<CheckoutReport, ServiceError> {
        let order_number = self.order_number_for(source, &lines).await;
        self.in_flight = Some(InFlightCheckout {
            source,
            order_number: order_number.clone(),
            lines: lines.clone(),
            order_id: None,
        });

        let placed = match self
            .services
            .orders
            .build_order(BuildOrderRequest {
                guardian_id: self.guardian.id,
                source,
                order_number: Some(order_number),
                lines,
                notes,
            })
            .await
        {
            Ok(placed) => placed,
            Err(e) => {
                if matches!(e, ServiceError::PartialOrder { .. }) {
                    // The voided order's number cannot be resumed.
                    self.in_flight = None;
                }
                return Err(e);
            }
        };

        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.order_id = Some(placed.order.id);
            in_flight.order_number = OrderNumber::new(placed.order.order_number.clone());
        }

        self.pay(placed.order, Some(source)).await
    }

    /// Reuses the in-flight number when retrying the same lines; otherwise
    /// voids the stale unpaid order and starts fresh.
    async fn order_number_for(
        &mut self,
        source: CheckoutSource,
        lines: &[OrderableLine],
    ) -> OrderNumber {
        if let Some(in_flight) = self.in_flight.take() {
            if in_flight.source == source && in_flight.lines == lines {
                info!(order_number = %in_flight.order_number, "Retrying in-flight checkout");
                return in_flight.order_number;
            }
            if in_flight.source == source {
                if let Some(stale) = in_flight.order_id {
                    if let Err(e) = self
                        .services
                        .orders
                        .void_order(stale, "superseded by a changed checkout")
                        .await
                    {
                        warn!(order_id = %stale, error = %e, "Could not void superseded order");
                    }
                }
            } else {
                // A checkout on the other path stays resumable from order history.
                info!(order_number = %in_flight.order_number, "Leaving other checkout pending");
            }
        }
        OrderNumber::generate(source)
    }

    async fn pay(
        &mut self,
        order: Order,
        source: Option<CheckoutSource>,
    ) -> Result<CheckoutReport, ServiceError> {
        let OpenedSession { order, token, .. } = self
            .services
            .sessions
            .open_session(&order, &self.guardian.customer)
            .await?;

        let widget = self.services.widgets.widget().await?;
        let callback = widget.open(&token).await;
        info!(order_number = %order.order_number, callback = callback.name(), "Payment widget returned");

        let outcome = self
            .services
            .reconciler
            .acknowledge(order.id, &callback)
            .await?;

        let cleared = outcome.clear_checkout_state && self.clear_after(source).await;
        let ReconcileOutcome {
            order,
            current,
            notification,
            ..
        } = outcome;
        self.services.notifier.notify(notification).await;

        Ok(CheckoutReport {
            order,
            callback,
            payment_status: current,
            cleared,
        })
    }

    async fn clear_after(&mut self, source: Option<CheckoutSource>) -> bool {
        let Some(source) = source else {
            return false;
        };
        match source {
            CheckoutSource::Cart => self.cart.clear(),
            CheckoutSource::Batch => {
                self.batch.clear();
                self.cart.clear();
            }
        }
        if self.in_flight.as_ref().map(|f| f.source) == Some(source) {
            self.in_flight = None;
        }
        info!(source = source.as_str(), "Checkout state cleared");
        self.services
            .event_sender
            .emit(Event::CheckoutStateCleared { source })
            .await;
        true
    }

    async fn report_failure(
        &self,
        result: Result<CheckoutReport, ServiceError>,
    ) -> Result<CheckoutReport, ServiceError> {
        if let Err(e) = &result {
            warn!(error = %e, retryable = e.is_retryable(), "Checkout did not complete");
            let order_id = match e {
                ServiceError::PartialOrder { order_id } | ServiceError::TokenPersist { order_id, .. } => {
                    Some(*order_id)
                }
                _ => self.in_flight.as_ref().and_then(|f| f.order_id),
            };
            let message = if e.is_retryable() {
                format!("{} Please try again.", e.response_message())
            } else {
                e.response_message()
            };
            self.services
                .notifier
                .notify(Notification::new(
                    self.guardian.id,
                    order_id,
                    NotificationKind::CheckoutFailed,
                    "Checkout failed",
                    message,
                ))
                .await;
        }
        result
    }
}

fn batch_notes(entries: &[BatchEntry]) -> String {
    let mut notes = format!("Batch order with {} entries", entries.len());
    for entry in entries {
        if let Some(entry_notes) = &entry.notes {
            notes.push_str(&format!("\n{}: {}", entry.child_name, entry_notes));
        }
    }
    notes
}
