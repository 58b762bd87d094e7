use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::GuardianId;
use crate::entities::PaymentStatus;
use crate::errors::ServiceError;
use crate::gateway::GatewayCallback;
use crate::models::CustomerDetails;
use crate::{ApiResponse, ApiResult, AppState};

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSessionRequest {
    pub name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSessionResponse {
    pub order_id: Uuid,
    pub order_number: String,
    pub token: String,
    pub redirect_url: Option<String>,
    /// Public key the browser widget is initialised with.
    pub client_key: String,
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentResultResponse {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub clear_checkout_state: bool,
}

/// POST /orders/:id/payment-session
///
/// Opens (or reuses) the gateway session for one of the guardian's unpaid
/// orders. The widget itself runs in the browser with the returned token.
pub async fn open_payment_session(
    State(state): State<AppState>,
    GuardianId(guardian_id): GuardianId,
    Path(order_id): Path<Uuid>,
    Json(body): Json<PaymentSessionRequest>,
) -> ApiResult<PaymentSessionResponse> {
    let detail = state.history.order_detail(guardian_id, order_id).await?;
    if !detail.can_resume_payment {
        return Err(ServiceError::InvalidOperation(format!(
            "order {} is {}/{} and cannot be paid",
            detail.order.order_number,
            detail.order.status.as_str(),
            detail.order.payment_status.as_str()
        )));
    }

    let customer = CustomerDetails::new(body.name, body.email, body.phone);
    let opened = state.sessions.open_session(&detail.order, &customer).await?;

    Ok(Json(ApiResponse::success(PaymentSessionResponse {
        order_id: opened.order.id,
        order_number: opened.order.order_number,
        token: opened.token.into_inner(),
        redirect_url: opened.redirect_url,
        client_key: state.config.gateway_client_key.clone(),
        reused: opened.reused,
    })))
}

/// POST /orders/:id/payment-result
///
/// Relays the browser widget's callback. The payment status only moves on a
/// signed gateway notification; this tells the client whether to clear its
/// cart or batch.
pub async fn report_payment_result(
    State(state): State<AppState>,
    GuardianId(guardian_id): GuardianId,
    Path(order_id): Path<Uuid>,
    Json(callback): Json<GatewayCallback>,
) -> ApiResult<PaymentResultResponse> {
    // Ownership check before touching payment state.
    state.history.order_detail(guardian_id, order_id).await?;

    let outcome = state.reconciler.acknowledge(order_id, &callback).await?;
    info!(
        order_id = %order_id,
        callback = callback.name(),
        payment_status = outcome.current.as_str(),
        "Widget result acknowledged"
    );

    let response = PaymentResultResponse {
        order_id,
        payment_status: outcome.current,
        clear_checkout_state: outcome.clear_checkout_state,
    };
    state.notifier.notify(outcome.notification).await;
    Ok(Json(ApiResponse::success(response)))
}
