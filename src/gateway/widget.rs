use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::{GatewayCallback, SessionToken};
use crate::errors::ServiceError;

/// Client-side payment surface. Each call to `open` resolves with exactly one
/// callback.
#[async_trait]
pub trait PaymentWidget: Send + Sync {
    async fn open(&self, token: &SessionToken) -> GatewayCallback;
}

/// Process-wide handle to the loaded payment widget.
#[derive(Default)]
pub struct WidgetRuntime {
    widget: RwLock<Option<Arc<dyn PaymentWidget>>>,
}

impl WidgetRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime that starts out with `widget` loaded.
    pub fn loaded(widget: Arc<dyn PaymentWidget>) -> Self {
        Self {
            widget: RwLock::new(Some(widget)),
        }
    }

    pub async fn init(&self, widget: Arc<dyn PaymentWidget>) {
        *self.widget.write().await = Some(widget);
        info!("Payment widget loaded");
    }

    pub async fn teardown(&self) {
        if self.widget.write().await.take().is_some() {
            info!("Payment widget unloaded");
        }
    }

    pub async fn is_loaded(&self) -> bool {
        self.widget.read().await.is_some()
    }

    pub async fn widget(&self) -> Result<Arc<dyn PaymentWidget>, ServiceError> {
        self.widget
            .read()
            .await
            .clone()
            .ok_or(ServiceError::WidgetNotLoaded)
    }
}
