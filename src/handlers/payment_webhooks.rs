use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::info;

use crate::errors::ServiceError;
use crate::gateway::GatewayNotification;
use crate::AppState;

/// POST /payments/notifications
///
/// Server-to-server status push from the gateway. Authenticated by the
/// notification's own signature, not by a guardian header.
pub async fn payment_notification(
    State(state): State<AppState>,
    Json(notification): Json<GatewayNotification>,
) -> Result<impl IntoResponse, ServiceError> {
    let outcome = state
        .reconciler
        .apply_notification(&notification, &state.config.gateway_server_key)
        .await?;

    info!(
        order_number = %outcome.order.order_number,
        transaction_status = %notification.transaction_status,
        payment_status = outcome.current.as_str(),
        "Gateway notification processed"
    );
    // Redelivered notifications on a settled order stay silent.
    if outcome.changed() {
        state.notifier.notify(outcome.notification).await;
    }

    Ok((StatusCode::OK, "ok"))
}
