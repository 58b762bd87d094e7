use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{Order, OrderLineItem, OrderStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{GatewayItem, PaymentGateway, SessionRequest, SessionToken};
use crate::models::CustomerDetails;
use crate::repositories::{OrderPatch, OrderStore};

const PERSIST_BACKOFF_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedSession {
    pub order: Order,
    pub token: SessionToken,
    pub redirect_url: Option<String>,
    /// True when the token was already on the order and no gateway call was made.
    pub reused: bool,
}

/// Opens gateway payment sessions and records their tokens on orders.
#[derive(Clone)]
pub struct PaymentSessionManager {
    store: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: Arc<EventSender>,
    gateway_timeout: Duration,
    token_persist_attempts: u32,
}

impl PaymentSessionManager {
    pub fn new(
        store: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        event_sender: Arc<EventSender>,
        gateway_timeout: Duration,
        token_persist_attempts: u32,
    ) -> Self {
        Self {
            store,
            gateway,
            event_sender,
            gateway_timeout,
            token_persist_attempts: token_persist_attempts.max(1),
        }
    }

    /// Returns the order's session, creating one at the gateway only when the
    /// stored order has none yet.
    #[instrument(skip(self, order, customer), fields(order_id = %order.id))]
    pub async fn open_session(
        &self,
        order: &Order,
        customer: &CustomerDetails,
    ) -> Result<OpenedSession, ServiceError> {
        customer.validate()?;

        let current = self
            .store
            .find_order(order.id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order.id)))?;

        if current.status == OrderStatus::Cancelled || current.payment_status.is_terminal() {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} is {}/{} and cannot be paid",
                current.order_number,
                current.status.as_str(),
                current.payment_status.as_str()
            )));
        }

        if let Some(token) = current.session_token.clone().filter(|t| !t.is_empty()) {
            info!("Reusing existing payment session");
            return Ok(OpenedSession {
                order: current,
                token: SessionToken::new(token),
                redirect_url: None,
                reused: true,
            });
        }

        let items = self.store.line_items(current.id).await?;
        if items.is_empty() {
            return Err(ServiceError::InvalidOperation(format!(
                "order {} has no line items",
                current.order_number
            )));
        }

        let request = session_request(&current, &items, customer);
        let grant = match tokio::time::timeout(
            self.gateway_timeout,
            self.gateway.create_session(&request),
        )
        .await
        {
            Ok(Ok(grant)) => grant,
            Ok(Err(e)) => {
                warn!(error = %e, "Gateway refused to open a session");
                return Err(e.into());
            }
            Err(_) => {
                warn!(timeout = ?self.gateway_timeout, "Gateway session request timed out");
                return Err(ServiceError::GatewayUnavailable(format!(
                    "no response within {:?}",
                    self.gateway_timeout
                )));
            }
        };

        let order = self.persist_token(current.id, &grant.token).await?;
        info!(order_number = %order.order_number, "Payment session opened");
        self.event_sender
            .emit(Event::PaymentSessionOpened { order_id: order.id })
            .await;

        Ok(OpenedSession {
            order,
            token: grant.token,
            redirect_url: grant.redirect_url,
            reused: false,
        })
    }

    /// Saves an already-issued token, retrying the store write. Safe to call
    /// again after a [`ServiceError::TokenPersist`].
    #[instrument(skip(self, token))]
    pub async fn persist_token(
        &self,
        order_id: Uuid,
        token: &SessionToken,
    ) -> Result<Order, ServiceError> {
        for attempt in 1..=self.token_persist_attempts {
            match self
                .store
                .update_order(order_id, OrderPatch::session_token(token.as_str()))
                .await
            {
                Ok(order) => return Ok(order),
                Err(e) => {
                    warn!(
                        attempt,
                        max = self.token_persist_attempts,
                        error = %e,
                        "Saving session token failed"
                    );
                    if attempt < self.token_persist_attempts {
                        tokio::time::sleep(Duration::from_millis(
                            PERSIST_BACKOFF_MS * u64::from(attempt),
                        ))
                        .await;
                    }
                }
            }
        }

        error!("Session token issued but not saved");
        Err(ServiceError::TokenPersist {
            order_id,
            token: token.to_string(),
        })
    }
}

/// Gateway request parallel to the order's line items.
pub fn session_request(
    order: &Order,
    items: &[OrderLineItem],
    customer: &CustomerDetails,
) -> SessionRequest {
    SessionRequest {
        gateway_order_id: order.gateway_order_id.clone(),
        gross_amount: order.total_amount,
        customer: customer.clone(),
        items: items
            .iter()
            .map(|item| GatewayItem {
                id: item.menu_item_id.to_string(),
                name: format!("{} - {}", item.menu_item_name, item.child_name),
                price: item.unit_price,
                quantity: u32::try_from(item.quantity).unwrap_or(0),
            })
            .collect(),
    }
}
