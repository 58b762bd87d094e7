//! End-to-end checkout flows against the in-memory store.
//!
//! Tests cover:
//! - Single-child cart checkout through to a settled order
//! - Multi-child batch checkout producing one combined order
//! - Closed, error and pending widget outcomes and what they leave behind
//! - Retrying and resuming without duplicate orders or sessions

mod common;

use assert_matches::assert_matches;
use common::{error, menu_item, pending, success, delivery_date, Harness};
use meal_checkout::{
    entities::{OrderStatus, PaymentStatus},
    errors::ServiceError,
    gateway::GatewayCallback,
    notifications::NotificationKind,
    repositories::OrderStore,
};
use rust_decimal_macros::dec;
use std::collections::HashSet;
use uuid::Uuid;

// ==================== Cart checkout ====================

#[tokio::test]
async fn single_child_cart_checkout_is_cleared_and_paid_on_settlement() {
    let h = Harness::new();
    let mut session = h.session();
    let nasi = menu_item("Nasi Goreng", dec!(15000));
    session
        .add_to_cart(&nasi, h.ayu.id, delivery_date(), 2)
        .unwrap();
    h.widget.push(success());

    let report = session.checkout_now(Some("extra sambal".into())).await.unwrap();

    // The widget's word alone does not mark the order paid.
    assert_eq!(report.payment_status, PaymentStatus::Pending);
    assert_eq!(report.order.payment_status, PaymentStatus::Pending);
    assert_eq!(report.order.status, OrderStatus::Pending);
    assert_eq!(report.order.total_amount, dec!(30000));
    assert_eq!(report.order.child_name, "Ayu");
    assert_eq!(report.order.child_class, "3A");
    assert_eq!(report.order.currency, "IDR");
    assert_eq!(report.order.notes.as_deref(), Some("extra sambal"));
    assert!(report.order.order_number.starts_with("ORDER-"));
    assert_eq!(report.order.session_token.as_deref(), Some("snap-token-1"));
    assert!(report.cleared);
    assert!(session.cart().is_empty());
    assert!(session.pending_order_number().is_none());

    let items = h.store.line_items(report.order.id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].total_price, dec!(30000));
    assert_eq!(items[0].child_id, h.ayu.id);

    let requests = h.gateway.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].gross_amount, dec!(30000));
    assert_eq!(requests[0].items[0].name, "Nasi Goreng - Ayu");
    assert_eq!(requests[0].customer.email, "sari@example.com");

    assert_eq!(h.notifier.kinds(), vec![NotificationKind::PaymentSucceeded]);

    let settled = h.settle(&report.order).await;
    assert_eq!(settled.current, PaymentStatus::Paid);
    let stored = h.store.find_order(report.order.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn cart_with_two_children_names_order_after_both() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Soto Ayam", dec!(12000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    session
        .add_to_cart(&menu_item("Mie Goreng", dec!(10000)), h.budi.id, delivery_date(), 1)
        .unwrap();
    h.widget.push(success());

    let report = session.checkout_now(None).await.unwrap();

    assert_eq!(report.order.child_name, "2 children");
    assert_eq!(report.order.child_class, "Multiple");
    assert_eq!(report.order.total_amount, dec!(22000));
}

#[tokio::test]
async fn empty_cart_is_refused_without_writing() {
    let h = Harness::new();
    let mut session = h.session();

    let err = session.checkout_now(None).await.unwrap_err();

    assert_matches!(err, ServiceError::EmptyCart);
    assert_eq!(h.store.order_count(), 0);
    assert_eq!(h.gateway.calls(), 0);
    assert_eq!(h.notifier.kinds(), vec![NotificationKind::CheckoutFailed]);
}

// ==================== Batch checkout ====================

#[tokio::test]
async fn batch_for_two_children_becomes_one_order() {
    let h = Harness::new();
    let mut session = h.session();

    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    session
        .commit_child_cart(h.ayu.id, Some("no peanuts".into()))
        .await
        .unwrap();
    assert!(session.cart().is_empty());

    session
        .add_to_cart(&menu_item("Soto Ayam", dec!(12000)), h.budi.id, delivery_date(), 2)
        .unwrap();
    session.commit_child_cart(h.budi.id, None).await.unwrap();
    assert_eq!(session.batch().entries().len(), 2);
    assert_eq!(session.batch().total_amount(), dec!(39000));

    h.widget.push(success());
    let report = session.checkout_batch().await.unwrap();

    assert_eq!(h.store.order_count(), 1);
    assert!(report.order.order_number.starts_with("BATCH-"));
    assert_eq!(report.order.total_amount, dec!(39000));
    assert_eq!(report.order.child_name, "2 children");
    assert_eq!(report.order.child_class, "Multiple");
    assert_eq!(
        report.order.notes.as_deref(),
        Some("Batch order with 2 entries\nAyu: no peanuts")
    );
    assert_eq!(report.payment_status, PaymentStatus::Pending);

    let items = h.store.line_items(report.order.id).await.unwrap();
    let children: HashSet<Uuid> = items.iter().map(|i| i.child_id).collect();
    assert_eq!(children, HashSet::from([h.ayu.id, h.budi.id]));
    let budi_line = items.iter().find(|i| i.child_id == h.budi.id).unwrap();
    assert_eq!(budi_line.child_name, "Budi");
    assert_eq!(budi_line.child_class.as_deref(), Some("5B"));

    assert!(report.cleared);
    assert!(session.batch().is_empty());
    assert!(session.cart().is_empty());
    assert_eq!(
        h.notifier.kinds(),
        vec![
            NotificationKind::BatchEntryAdded,
            NotificationKind::BatchEntryAdded,
            NotificationKind::PaymentSucceeded,
        ]
    );
}

#[tokio::test]
async fn empty_batch_is_refused() {
    let h = Harness::new();
    let mut session = h.session();

    assert_matches!(
        session.checkout_batch().await,
        Err(ServiceError::EmptyCart)
    );
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn committing_for_unknown_child_keeps_cart() {
    let h = Harness::new();
    let mut session = h.session();
    let stranger = Uuid::new_v4();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), stranger, delivery_date(), 1)
        .unwrap();

    let err = session.commit_child_cart(stranger, None).await.unwrap_err();

    assert_matches!(err, ServiceError::ValidationError(_));
    assert!(session.batch().is_empty());
    assert_eq!(session.cart().count(), 1);
}

#[tokio::test]
async fn removed_batch_entry_is_not_charged() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    let ayu_entry = session.commit_child_cart(h.ayu.id, None).await.unwrap();
    session
        .add_to_cart(&menu_item("Soto Ayam", dec!(12000)), h.budi.id, delivery_date(), 1)
        .unwrap();
    session.commit_child_cart(h.budi.id, None).await.unwrap();

    assert!(session.remove_batch_entry(ayu_entry.id).is_some());
    h.widget.push(success());
    let report = session.checkout_batch().await.unwrap();

    assert_eq!(report.order.total_amount, dec!(12000));
    assert_eq!(report.order.child_name, "Budi");
}

// ==================== Widget outcomes ====================

#[tokio::test]
async fn closing_the_widget_keeps_cart_and_order_pending() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();

    let report = session.checkout_now(None).await.unwrap();

    assert_eq!(report.callback, GatewayCallback::Closed);
    assert_eq!(report.payment_status, PaymentStatus::Pending);
    assert!(!report.cleared);
    assert_eq!(session.cart().count(), 1);
    assert_eq!(
        session.pending_order_number().map(|n| n.to_string()),
        Some(report.order.order_number.clone())
    );
    assert_eq!(h.notifier.kinds(), vec![NotificationKind::PaymentClosed]);
}

#[tokio::test]
async fn retry_after_close_reuses_order_and_session() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();

    let first = session.checkout_now(None).await.unwrap();
    h.widget.push(success());
    let second = session.checkout_now(None).await.unwrap();

    assert_eq!(first.order.id, second.order.id);
    assert_eq!(h.store.order_count(), 1);
    assert_eq!(h.gateway.calls(), 1);
    let opened = h.widget.opened();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[0], opened[1]);
    assert_eq!(second.payment_status, PaymentStatus::Pending);
    assert!(second.cleared);
    assert!(session.cart().is_empty());
}

#[tokio::test]
async fn error_outcome_keeps_cart_for_retry() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.widget.push(error());

    let report = session.checkout_now(None).await.unwrap();

    assert_eq!(report.payment_status, PaymentStatus::Pending);
    assert!(!report.cleared);
    assert_eq!(session.cart().count(), 1);
    assert_eq!(h.notifier.kinds(), vec![NotificationKind::PaymentError]);
}

#[tokio::test]
async fn pending_outcome_clears_cart_but_leaves_order_unpaid() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.widget.push(pending());

    let report = session.checkout_now(None).await.unwrap();

    assert_eq!(report.payment_status, PaymentStatus::Pending);
    assert!(report.cleared);
    assert!(session.cart().is_empty());
    assert_eq!(h.notifier.kinds(), vec![NotificationKind::PaymentPending]);
}

#[tokio::test]
async fn changing_cart_after_close_voids_the_stale_order() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    let stale = session.checkout_now(None).await.unwrap().order;

    session
        .add_to_cart(&menu_item("Es Teh", dec!(3000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.widget.push(success());
    let fresh = session.checkout_now(None).await.unwrap();

    assert_ne!(stale.id, fresh.order.id);
    assert_ne!(stale.order_number, fresh.order.order_number);
    assert_eq!(fresh.order.total_amount, dec!(18000));
    let stale_now = h.store.find_order(stale.id).await.unwrap().unwrap();
    assert_eq!(stale_now.status, OrderStatus::Cancelled);
    assert_eq!(stale_now.payment_status, PaymentStatus::Pending);
}

// ==================== Resuming payment ====================

#[tokio::test]
async fn widget_not_loaded_leaves_order_resumable() {
    let h = Harness::new();
    h.widgets.teardown().await;
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();

    let err = session.checkout_now(None).await.unwrap_err();
    assert_matches!(err, ServiceError::WidgetNotLoaded);
    assert!(err.is_retryable());

    let orders = h
        .store
        .list_orders(&meal_checkout::repositories::OrderFilter::for_guardian(h.guardian.id))
        .await
        .unwrap();
    assert_eq!(orders.len(), 1);
    assert!(orders[0].has_session());
    assert_eq!(session.cart().count(), 1);

    h.widgets.init(h.widget.clone()).await;
    h.widget.push(success());
    let report = session.resume_payment(orders[0].id).await.unwrap();

    assert_eq!(report.order.id, orders[0].id);
    assert_eq!(report.payment_status, PaymentStatus::Pending);
    assert!(report.cleared);
    assert!(session.cart().is_empty());
    assert_eq!(h.gateway.calls(), 1);
}

#[tokio::test]
async fn resume_from_history_does_not_touch_a_fresh_cart() {
    let h = Harness::new();
    let mut first = h.session();
    first
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    let order = first.checkout_now(None).await.unwrap().order;

    let mut later = h.session();
    later
        .add_to_cart(&menu_item("Soto Ayam", dec!(12000)), h.budi.id, delivery_date(), 1)
        .unwrap();
    h.widget.push(success());
    let report = later.resume_payment(order.id).await.unwrap();

    assert_eq!(report.payment_status, PaymentStatus::Pending);
    assert!(!report.cleared);
    assert_eq!(later.cart().count(), 1);
}

#[tokio::test]
async fn paid_orders_cannot_be_resumed() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    h.widget.push(success());
    let order = session.checkout_now(None).await.unwrap().order;
    h.settle(&order).await;

    let err = session.resume_payment(order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
    assert_eq!(h.gateway.calls(), 1);
}

#[tokio::test]
async fn another_guardians_order_is_not_found() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    let order = session.checkout_now(None).await.unwrap().order;

    let mut intruder = meal_checkout::services::CheckoutSession::new(
        meal_checkout::models::Guardian {
            id: Uuid::new_v4(),
            customer: h.guardian.customer.clone(),
        },
        h.services.clone(),
    );
    assert_matches!(
        intruder.resume_payment(order.id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn widget_success_after_gateway_settlement_reports_paid() {
    let h = Harness::new();
    let mut session = h.session();
    session
        .add_to_cart(&menu_item("Nasi Goreng", dec!(15000)), h.ayu.id, delivery_date(), 1)
        .unwrap();
    let order = session.checkout_now(None).await.unwrap().order;
    h.settle(&order).await;

    h.widget.push(success());
    let report = session.resume_payment(order.id).await;

    // Settled orders are not reopened, so the widget never runs again.
    assert_matches!(report, Err(ServiceError::InvalidOperation(_)));
    let acknowledged = h
        .services
        .reconciler
        .acknowledge(order.id, &success())
        .await
        .unwrap();
    assert_eq!(acknowledged.current, PaymentStatus::Paid);
    assert!(acknowledged.clear_checkout_state);
}
