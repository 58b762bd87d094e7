//! Meal checkout library
//!
//! Cart, per-child batch and payment orchestration for guardians ordering
//! school meals, plus the HTTP surface for order history, payment resumption
//! and gateway notifications.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod notifications;
pub mod repositories;
pub mod services;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::notifications::Notifier;
use crate::services::{
    CheckoutServices, OrderHistoryService, PaymentReconciler, PaymentSessionManager,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state behind every HTTP route.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// `None` when running on the in-memory store.
    pub db: Option<Arc<DbPool>>,
    pub history: OrderHistoryService,
    pub sessions: PaymentSessionManager,
    pub reconciler: PaymentReconciler,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        db: Option<Arc<DbPool>>,
        services: &CheckoutServices,
    ) -> Self {
        Self {
            config,
            db,
            history: OrderHistoryService::new(services.store.clone()),
            sessions: services.sessions.clone(),
            reconciler: services.reconciler.clone(),
            notifier: services.notifier.clone(),
        }
    }
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Guardian-facing and gateway-facing routes.
pub fn api_routes() -> Router<AppState> {
    let orders = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/payment-session",
            post(handlers::payments::open_payment_session),
        )
        .route(
            "/orders/:id/payment-result",
            post(handlers::payments::report_payment_result),
        );

    let gateway = Router::new().route(
        "/payments/notifications",
        post(handlers::payment_webhooks::payment_notification),
    );

    orders.merge(gateway)
}

/// Full application router with tracing and a request deadline.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .merge(api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}
