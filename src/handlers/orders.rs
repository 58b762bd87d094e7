use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use super::GuardianId;
use crate::services::{OrderDetail, OrderListResponse, OrderQuery};
use crate::{ApiResponse, ApiResult, AppState};

/// GET /orders
pub async fn list_orders(
    State(state): State<AppState>,
    GuardianId(guardian_id): GuardianId,
    Query(query): Query<OrderQuery>,
) -> ApiResult<OrderListResponse> {
    let orders = state.history.list_orders(guardian_id, &query).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// GET /orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    GuardianId(guardian_id): GuardianId,
    Path(order_id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let detail = state.history.order_detail(guardian_id, order_id).await?;
    Ok(Json(ApiResponse::success(detail)))
}
