use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::PaymentStatus;
use crate::models::CheckoutSource;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiver that feeds `process_events`.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the loop is gone.
    pub async fn emit(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Checkout lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        source: CheckoutSource,
    },
    OrderVoided {
        order_id: Uuid,
        reason: String,
    },
    PaymentSessionOpened {
        order_id: Uuid,
    },
    PaymentStatusChanged {
        order_id: Uuid,
        old_status: PaymentStatus,
        new_status: PaymentStatus,
    },
    ReconciliationAmbiguous {
        order_id: Uuid,
        reported_status: String,
    },
    CheckoutStateCleared {
        source: CheckoutSource,
    },
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Drains the channel, logging every event and handing it to each handler.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
                source,
            } => info!(
                "Order created: order_id={}, order_number={}, source={}",
                order_id,
                order_number,
                source.as_str()
            ),
            Event::OrderVoided { order_id, reason } => {
                warn!("Order voided: order_id={}, reason={}", order_id, reason)
            }
            Event::PaymentSessionOpened { order_id } => {
                info!("Payment session opened: order_id={}", order_id)
            }
            Event::PaymentStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(
                "Payment status changed: order_id={}, {} -> {}",
                order_id,
                old_status.as_str(),
                new_status.as_str()
            ),
            Event::ReconciliationAmbiguous {
                order_id,
                reported_status,
            } => error!(
                "Unmapped gateway status for order {}: {}",
                order_id, reported_status
            ),
            Event::CheckoutStateCleared { source } => {
                info!("Checkout state cleared after {} checkout", source.as_str())
            }
        }

        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!("Event handler failed: event={:?}, error={}", event, e);
            }
        }
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle_event(&self, event: &Event) -> Result<(), String> {
            self.seen.lock().await.push(event.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn loop_forwards_events_until_senders_drop() {
        let (sender, rx) = EventSender::channel(8);
        let recorder = Arc::new(Recorder::default());
        let worker = tokio::spawn(process_events(rx, vec![recorder.clone()]));

        let order_id = Uuid::new_v4();
        sender.emit(Event::PaymentSessionOpened { order_id }).await;
        sender
            .emit(Event::CheckoutStateCleared {
                source: CheckoutSource::Batch,
            })
            .await;
        drop(sender);
        worker.await.unwrap();

        let seen = recorder.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Event::PaymentSessionOpened { order_id });
    }
}
