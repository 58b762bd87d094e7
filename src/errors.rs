use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repositories::StoreError;

/// Body returned by every failing HTTP route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Whether the guardian can retry the same action
    pub retryable: bool,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Validation error: cart is empty")]
    EmptyCart,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Persistence error: {0}")]
    Persistence(
        #[from]
        #[serde(skip)]
        StoreError,
    ),

    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Order {order_id} could not be fully recorded and was voided")]
    PartialOrder { order_id: Uuid },

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Session token for order {order_id} was issued but could not be saved")]
    TokenPersist { order_id: Uuid, token: String },

    #[error("Payment widget is not loaded")]
    WidgetNotLoaded,

    #[error("Reconciliation ambiguity: {0}")]
    ReconciliationAmbiguity(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) | Self::EmptyCart | Self::InvalidOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Persistence(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Persistence(StoreError::DuplicateKey(_)) | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
            Self::Persistence(_) | Self::DatabaseError(_) | Self::PartialOrder { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::TokenPersist { .. } | Self::WidgetNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            Self::ReconciliationAmbiguity(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Storage errors return a generic message.
    pub fn response_message(&self) -> String {
        match self {
            Self::Persistence(_) | Self::DatabaseError(_) => "Database error".to_string(),
            Self::TokenPersist { order_id, .. } => format!(
                "Payment session for order {} is open but not yet saved; retry to continue",
                order_id
            ),
            _ => self.to_string(),
        }
    }

    /// Whether a guardian-initiated retry of the same action can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GatewayUnavailable(_)
                | Self::TokenPersist { .. }
                | Self::WidgetNotLoaded
                | Self::PartialOrder { .. }
                | Self::Persistence(StoreError::Database(_))
                | Self::DatabaseError(_)
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            retryable: self.is_retryable(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
