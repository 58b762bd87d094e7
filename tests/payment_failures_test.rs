//! Checkout behavior when a collaborator fails part-way.

mod common;

use assert_matches::assert_matches;
use common::{delivery_date, menu_item, success, Harness, MockGateway, SlowGateway};
use meal_checkout::{
    entities::{OrderStatus, PaymentStatus},
    errors::ServiceError,
    gateway::{GatewayError, SessionGrant, SessionToken},
    models::child::PLACEHOLDER_CLASS,
    notifications::NotificationKind,
    repositories::{OrderFilter, OrderStore, StoreError},
    services::PaymentSessionManager,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

fn last_failure_message(h: &Harness) -> String {
    h.notifier
        .sent()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::CheckoutFailed)
        .last()
        .map(|n| n.message)
        .unwrap_or_default()
}

// ==================== Persistence ====================

#[tokio::test]
async fn line_item_failure_voids_header_and_keeps_cart() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.store.fail_next_line_item_inserts(1);

    let err = session.checkout_now(None).await.unwrap_err();
    let order_id = match err {
        ServiceError::PartialOrder { order_id } => order_id,
        other => panic!("expected partial order, got {:?}", other),
    };

    let voided = h.store.find_order(order_id).await.unwrap().unwrap();
    assert_eq!(voided.status, OrderStatus::Cancelled);
    assert!(h.store.line_items(order_id).await.unwrap().is_empty());
    assert_eq!(h.gateway.calls(), 0);
    assert_eq!(session.cart().count(), 1);
    assert!(session.pending_order_number().is_none());
    assert!(last_failure_message(&h).ends_with("Please try again."));

    h.widget.push(success());
    let report = session.checkout_now(None).await.unwrap();
    assert_ne!(report.order.id, order_id);
    assert_ne!(report.order.order_number, voided.order_number);
    assert_eq!(report.payment_status, PaymentStatus::Pending);
    assert!(report.cleared);
    assert_eq!(h.store.order_count(), 2);
}

#[tokio::test]
async fn unavailable_store_fails_before_the_gateway() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.store.set_unavailable(true);

    let err = session.checkout_now(None).await.unwrap_err();

    assert_matches!(err, ServiceError::Persistence(StoreError::Database(_)));
    assert!(err.is_retryable());
    assert_eq!(h.gateway.calls(), 0);
    assert!(h.widget.opened().is_empty());
    assert_eq!(session.cart().count(), 1);
}

#[tokio::test]
async fn token_that_cannot_be_saved_is_reported_and_retry_recovers() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.store
        .fail_next_updates(h.config.token_persist_attempts as usize);

    let err = session.checkout_now(None).await.unwrap_err();
    let (order_id, token) = match &err {
        ServiceError::TokenPersist { order_id, token } => (*order_id, token.clone()),
        other => panic!("expected token persist failure, got {:?}", other),
    };
    assert_eq!(token, "snap-token-1");
    assert!(err.is_retryable());
    assert!(h.widget.opened().is_empty());
    let order = h.store.find_order(order_id).await.unwrap().unwrap();
    assert!(!order.has_session());
    assert_eq!(order.status, OrderStatus::Pending);

    h.widget.push(success());
    let report = session.checkout_now(None).await.unwrap();
    assert_eq!(report.order.id, order_id);
    assert_eq!(report.payment_status, PaymentStatus::Pending);
    assert!(report.cleared);
    assert_eq!(h.store.order_count(), 1);
}

#[tokio::test]
async fn issued_token_can_be_saved_later() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.store
        .fail_next_updates(h.config.token_persist_attempts as usize);
    let (order_id, token) = match session.checkout_now(None).await.unwrap_err() {
        ServiceError::TokenPersist { order_id, token } => (order_id, token),
        other => panic!("expected token persist failure, got {:?}", other),
    };

    let order = h
        .services
        .sessions
        .persist_token(order_id, &SessionToken::new(token.clone()))
        .await
        .unwrap();

    assert_eq!(order.session_token.as_deref(), Some(token.as_str()));
}

// ==================== Gateway ====================

#[tokio::test]
async fn slow_gateway_times_out_as_retryable() {
    let mut h = Harness::new();
    h.services.sessions = PaymentSessionManager::new(
        h.store.clone(),
        Arc::new(SlowGateway {
            delay: Duration::from_millis(500),
        }),
        h.event_sender.clone(),
        Duration::from_millis(50),
        1,
    );
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();

    let err = session.checkout_now(None).await.unwrap_err();

    assert_matches!(err, ServiceError::GatewayUnavailable(_));
    assert!(last_failure_message(&h).ends_with("Please try again."));
    let orders = h
        .store
        .list_orders(&OrderFilter::for_guardian(h.guardian.id))
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert!(!orders[0].has_session());
    assert_eq!(session.cart().count(), 1);
}

#[tokio::test]
async fn transient_gateway_failure_then_retry_uses_same_order() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.gateway.fail_next(1);

    assert_matches!(
        session.checkout_now(None).await,
        Err(ServiceError::GatewayUnavailable(_))
    );

    h.widget.push(success());
    let report = session.checkout_now(None).await.unwrap();

    assert_eq!(h.store.order_count(), 1);
    assert_eq!(h.gateway.calls(), 2);
    assert_eq!(report.payment_status, PaymentStatus::Pending);
    assert!(report.cleared);
}

#[tokio::test]
async fn rejected_session_request_surfaces_as_gateway_unavailable() {
    let mut gateway = MockGateway::new();
    gateway.expect_create_session().times(1).returning(|_| {
        Err(GatewayError::Rejected {
            status: 401,
            message: "unknown merchant".into(),
        })
    });
    let h = Harness::new().with_gateway(Arc::new(gateway));
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();

    let err = session.checkout_now(None).await.unwrap_err();

    assert_matches!(err, ServiceError::GatewayUnavailable(ref msg) if msg.contains("401"));
    assert_eq!(h.notifier.kinds(), vec![NotificationKind::CheckoutFailed]);
}

#[tokio::test]
async fn session_is_requested_once_across_widget_reopenings() {
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_session()
        .withf(|request| {
            request.gross_amount == dec!(30000)
                && request.items.len() == 1
                && request.items[0].quantity == 2
                && request.gateway_order_id.starts_with("ORDER-")
        })
        .times(1)
        .returning(|_| {
            Ok(SessionGrant {
                token: SessionToken::new("mock-token"),
                redirect_url: None,
            })
        });
    let h = Harness::new().with_gateway(Arc::new(gateway));
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 2)
        .unwrap();

    session.checkout_now(None).await.unwrap();
    session.checkout_now(None).await.unwrap();
    h.widget.push(success());
    let report = session.checkout_now(None).await.unwrap();

    assert_eq!(report.payment_status, PaymentStatus::Pending);
    assert!(report.cleared);
    assert_eq!(h.widget.opened().len(), 3);
    assert!(h
        .widget
        .opened()
        .iter()
        .all(|t| t.as_str() == "mock-token"));
}

// ==================== Child directory ====================

#[tokio::test]
async fn directory_outage_falls_back_to_placeholder_identity() {
    let h = Harness::new();
    h.directory.set_unavailable(true);
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.widget.push(success());

    let report = session.checkout_now(None).await.unwrap();

    assert!(report.order.child_name.starts_with("Child "));
    assert_eq!(report.order.child_class, PLACEHOLDER_CLASS);
    let items = h.store.line_items(report.order.id).await.unwrap();
    assert_eq!(items[0].child_id, h.ayu.id);
}

#[tokio::test]
async fn directory_outage_after_a_listing_uses_cached_identity() {
    let h = Harness::new();
    h.services
        .children
        .list_children(h.guardian.id)
        .await
        .unwrap();
    h.directory.set_unavailable(true);
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.widget.push(success());

    let report = session.checkout_now(None).await.unwrap();

    assert_eq!(report.order.child_name, "Ayu");
    assert_eq!(report.order.child_class, "3A");
}
