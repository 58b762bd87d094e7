//! Maps payment verdicts onto order state.
//!
//! | payment status | event            | next    | clear cart/batch |
//! |----------------|------------------|---------|------------------|
//! | pending        | success          | paid    | yes              |
//! | pending        | pending          | pending | yes              |
//! | pending        | error            | pending | no               |
//! | pending        | closed           | pending | no               |
//! | pending        | failed (webhook) | failed  | no               |
//!
//! `paid` and `failed` are terminal; later events on them change nothing.
//! Only verified verdicts ([`PaymentReconciler::apply`], reached through a
//! signed gateway notification) write the payment status. Callbacks reported
//! by the payer's widget go through [`PaymentReconciler::acknowledge`], which
//! decides clearing and notification but leaves the order untouched.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::{Order, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{GatewayCallback, GatewayNotification, NotificationStatus};
use crate::notifications::{Notification, NotificationKind};
use crate::repositories::{OrderPatch, OrderStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEvent {
    Success,
    Pending,
    Error,
    Closed,
    /// Out-of-band decline, cancellation or expiry.
    Failed,
    Unrecognized(String),
}

impl PaymentEvent {
    pub fn name(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Pending => "pending",
            Self::Error => "error",
            Self::Closed => "closed",
            Self::Failed => "failed",
            Self::Unrecognized(status) => status,
        }
    }

    /// Maybe-success outcomes release the guardian's cart or batch.
    pub fn clears_checkout_state(&self) -> bool {
        matches!(self, Self::Success | Self::Pending)
    }
}

impl From<&GatewayCallback> for PaymentEvent {
    fn from(callback: &GatewayCallback) -> Self {
        match callback {
            GatewayCallback::Success(_) => Self::Success,
            GatewayCallback::Pending(_) => Self::Pending,
            GatewayCallback::Error(_) => Self::Error,
            GatewayCallback::Closed => Self::Closed,
        }
    }
}

impl From<NotificationStatus> for PaymentEvent {
    fn from(status: NotificationStatus) -> Self {
        match status {
            NotificationStatus::Success => Self::Success,
            NotificationStatus::Pending => Self::Pending,
            NotificationStatus::Failed => Self::Failed,
            NotificationStatus::Unrecognized(s) => Self::Unrecognized(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub order: Order,
    pub previous: PaymentStatus,
    pub current: PaymentStatus,
    /// Whether the cart or batch that produced this order may now be emptied.
    pub clear_checkout_state: bool,
    pub notification: Notification,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn OrderStore>,
    event_sender: Arc<EventSender>,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn OrderStore>, event_sender: Arc<EventSender>) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    /// Applies a verdict confirmed by the gateway itself.
    #[instrument(skip(self), fields(event = event.name()))]
    pub async fn apply(
        &self,
        order_id: Uuid,
        event: PaymentEvent,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if let PaymentEvent::Unrecognized(status) = &event {
            error!(
                order_number = %order.order_number,
                reported_status = %status,
                "Gateway reported a status with no mapping; order left pending"
            );
            counter!("checkout_payment_outcomes_total", 1, "outcome" => "ambiguous");
            self.event_sender
                .emit(Event::ReconciliationAmbiguous {
                    order_id,
                    reported_status: status.clone(),
                })
                .await;
            return Err(ServiceError::ReconciliationAmbiguity(format!(
                "order {} reported status '{}'",
                order.order_number, status
            )));
        }

        let previous = order.payment_status;
        if previous.is_terminal() {
            warn!(
                order_number = %order.order_number,
                status = previous.as_str(),
                "Payment event on settled order ignored"
            );
            let clear = previous == PaymentStatus::Paid && event.clears_checkout_state();
            let notification = payment_notification(&order, &event);
            return Ok(ReconcileOutcome {
                order,
                previous,
                current: previous,
                clear_checkout_state: clear,
                notification,
            });
        }

        if event == PaymentEvent::Success && order.status == OrderStatus::Cancelled {
            error!(
                order_number = %order.order_number,
                "Gateway settled a cancelled order; payment left pending for manual refund"
            );
            counter!("checkout_payment_outcomes_total", 1, "outcome" => "ambiguous");
            self.event_sender
                .emit(Event::ReconciliationAmbiguous {
                    order_id,
                    reported_status: "success on cancelled order".to_string(),
                })
                .await;
            return Err(ServiceError::ReconciliationAmbiguity(format!(
                "order {} is cancelled but the gateway reported a successful payment",
                order.order_number
            )));
        }

        let next = match event {
            PaymentEvent::Success => PaymentStatus::Paid,
            PaymentEvent::Failed => {
                if order.status.is_fulfilling() {
                    return Err(ServiceError::InvalidOperation(format!(
                        "order {} is already {} and cannot be marked failed",
                        order.order_number,
                        order.status.as_str()
                    )));
                }
                PaymentStatus::Failed
            }
            _ => previous,
        };

        let order = if next != previous {
            let updated = self
                .store
                .update_order(order.id, OrderPatch::payment_status(next))
                .await?;
            info!(
                order_number = %updated.order_number,
                from = previous.as_str(),
                to = next.as_str(),
                "Payment status changed"
            );
            self.event_sender
                .emit(Event::PaymentStatusChanged {
                    order_id: updated.id,
                    old_status: previous,
                    new_status: next,
                })
                .await;
            updated
        } else {
            info!(order_number = %order.order_number, "Payment status unchanged");
            order
        };

        counter!(
            "checkout_payment_outcomes_total",
            1,
            "outcome" => event.name().to_string()
        );
        let notification = payment_notification(&order, &event);
        Ok(ReconcileOutcome {
            order,
            previous,
            current: next,
            clear_checkout_state: event.clears_checkout_state(),
            notification,
        })
    }

    /// Records a callback reported by the payer's widget.
    ///
    /// The widget runs on the payer's side, so its verdict is not trusted to
    /// move the payment status; the signed notification does that. The
    /// outcome still says whether the checkout state may be cleared.
    #[instrument(skip(self, callback), fields(callback = callback.name()))]
    pub async fn acknowledge(
        &self,
        order_id: Uuid,
        callback: &GatewayCallback,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.has_session() {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} has no payment session",
                order.order_number
            )));
        }

        let event = PaymentEvent::from(callback);
        let current = order.payment_status;
        let clear = current != PaymentStatus::Failed && event.clears_checkout_state();
        if order.status == OrderStatus::Cancelled {
            warn!(
                order_number = %order.order_number,
                "Widget reported on a cancelled order"
            );
        }

        counter!(
            "checkout_payment_outcomes_total",
            1,
            "outcome" => format!("widget_{}", event.name())
        );
        let notification = widget_notification(&order, &event);
        Ok(ReconcileOutcome {
            order,
            previous: current,
            current,
            clear_checkout_state: clear,
            notification,
        })
    }

    /// Applies a signed server-to-server notification.
    #[instrument(skip(self, notification, server_key), fields(gateway_order_id = %notification.order_id))]
    pub async fn apply_notification(
        &self,
        notification: &GatewayNotification,
        server_key: &str,
    ) -> Result<ReconcileOutcome, ServiceError> {
        if !notification.verify_signature(server_key) {
            warn!("Gateway notification signature mismatch");
            return Err(ServiceError::Unauthorized(
                "invalid notification signature".to_string(),
            ));
        }

        let order = self
            .store
            .find_order_by_gateway_id(&notification.order_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", notification.order_id))
            })?;

        if notification.gross_amount() != Some(order.total_amount) {
            error!(
                reported = %notification.gross_amount,
                expected = %order.total_amount,
                "Notification amount does not match order total"
            );
            return Err(ServiceError::ReconciliationAmbiguity(format!(
                "order {} reported amount {}",
                order.order_number, notification.gross_amount
            )));
        }

        self.apply(order.id, PaymentEvent::from(notification.status()))
            .await
    }
}

/// Guardian-facing message for a widget callback. A reported success is
/// only confirmed once the gateway notifies us.
pub fn widget_notification(order: &Order, event: &PaymentEvent) -> Notification {
    if *event != PaymentEvent::Success || order.payment_status == PaymentStatus::Paid {
        return payment_notification(order, event);
    }
    Notification::new(
        order.guardian_id,
        Some(order.id),
        NotificationKind::PaymentSucceeded,
        "Payment received",
        format!(
            "Order {} for {} has been placed. We will confirm once the payment settles.",
            order.order_number, order.child_name
        ),
    )
}

/// Guardian-facing message for a payment event on `order`.
pub fn payment_notification(order: &Order, event: &PaymentEvent) -> Notification {
    let (kind, title, message) = match event {
        PaymentEvent::Success => (
            NotificationKind::PaymentSucceeded,
            "Payment successful",
            format!(
                "Order {} for {} has been placed and paid.",
                order.order_number, order.child_name
            ),
        ),
        PaymentEvent::Pending => (
            NotificationKind::PaymentPending,
            "Payment pending",
            format!(
                "Payment for order {} is being processed. We will confirm once it settles.",
                order.order_number
            ),
        ),
        PaymentEvent::Error => (
            NotificationKind::PaymentError,
            "Payment failed",
            "Something went wrong during payment. Your selection is kept so you can try again."
                .to_string(),
        ),
        PaymentEvent::Closed => (
            NotificationKind::PaymentClosed,
            "Payment cancelled",
            format!(
                "You closed the payment window. Order {} is waiting for payment.",
                order.order_number
            ),
        ),
        PaymentEvent::Failed => (
            NotificationKind::PaymentFailed,
            "Payment failed",
            format!(
                "Payment for order {} was declined or has expired.",
                order.order_number
            ),
        ),
        PaymentEvent::Unrecognized(_) => (
            NotificationKind::PaymentPending,
            "Payment under review",
            format!(
                "We could not confirm the payment for order {} yet.",
                order.order_number
            ),
        ),
    };
    Notification::new(order.guardian_id, Some(order.id), kind, title, message)
}
