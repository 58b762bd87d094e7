//! Contract with the external payment gateway.
//!
//! Session creation happens server-side through [`PaymentGateway`]; the payer
//! completes payment in a client-side widget that reports back exactly one
//! [`GatewayCallback`] per opening. Server-to-server notifications arrive
//! separately and are described in [`notification`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::errors::ServiceError;
use crate::models::CustomerDetails;

pub mod notification;
pub mod snap;
pub mod widget;

pub use notification::{GatewayNotification, NotificationStatus};
pub use snap::SnapGateway;
pub use widget::{PaymentWidget, WidgetRuntime};

/// Opaque credential authorizing one payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One receipt line shown by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayItem {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub gateway_order_id: String,
    pub gross_amount: Decimal,
    pub customer: CustomerDetails,
    pub items: Vec<GatewayItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionGrant {
    pub token: SessionToken,
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("gateway returned an unreadable response: {0}")]
    InvalidResponse(String),
    #[error("session request cannot be sent: {0}")]
    InvalidRequest(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::GatewayUnavailable(err.to_string())
    }
}

/// Server-side session creation.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionGrant, GatewayError>;
}

/// Result payload handed to widget callbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub transaction_status: Option<String>,
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
}

/// The single verdict a widget instance reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "result", rename_all = "snake_case")]
pub enum GatewayCallback {
    Success(TransactionResult),
    Pending(TransactionResult),
    Error(TransactionResult),
    /// The payer dismissed the widget without a verdict.
    Closed,
}

impl GatewayCallback {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::Pending(_) => "pending",
            Self::Error(_) => "error",
            Self::Closed => "closed",
        }
    }
}
