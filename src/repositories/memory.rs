use async_trait::async_trait;
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

use crate::entities::{Order, OrderLineItem};
use crate::models::Child;

use super::{ChildDirectory, OrderFilter, OrderPatch, OrderStore, StoreError};

/// Process-local order store with the same uniqueness rules as the database
/// schema. Failure switches let callers exercise the partial-write paths.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
    by_number: DashMap<String, Uuid>,
    by_gateway_id: DashMap<String, Uuid>,
    line_items: DashMap<Uuid, Vec<OrderLineItem>>,
    fail_line_items: AtomicUsize,
    fail_updates: AtomicUsize,
    unavailable: AtomicBool,
    order_inserts: AtomicUsize,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` line-item inserts fail.
    pub fn fail_next_line_item_inserts(&self, n: usize) {
        self.fail_line_items.store(n, Ordering::SeqCst);
    }

    /// The next `n` header updates fail.
    pub fn fail_next_updates(&self, n: usize) {
        self.fail_updates.store(n, Ordering::SeqCst);
    }

    /// Every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of header inserts attempted, including rejected duplicates.
    pub fn order_insert_attempts(&self) -> usize {
        self.order_inserts.load(Ordering::SeqCst)
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database("store unreachable".to_string()));
        }
        Ok(())
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert_order(&self, order: Order) -> Result<Order, StoreError> {
        self.check_available()?;
        self.order_inserts.fetch_add(1, Ordering::SeqCst);

        if self.orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateKey(format!("orders.id {}", order.id)));
        }
        if self.by_gateway_id.contains_key(&order.gateway_order_id) {
            return Err(StoreError::DuplicateKey(format!(
                "orders.gateway_order_id {}",
                order.gateway_order_id
            )));
        }

        match self.by_number.entry(order.order_number.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateKey(format!(
                "orders.order_number {}",
                order.order_number
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order.id);
                self.by_gateway_id
                    .insert(order.gateway_order_id.clone(), order.id);
                self.orders.insert(order.id, order.clone());
                Ok(order)
            }
        }
    }

    async fn insert_line_items(
        &self,
        items: Vec<OrderLineItem>,
    ) -> Result<Vec<OrderLineItem>, StoreError> {
        self.check_available()?;
        if Self::take_failure(&self.fail_line_items) {
            return Err(StoreError::Database(
                "line item insert rejected".to_string(),
            ));
        }
        if let Some(orphan) = items.iter().find(|i| !self.orders.contains_key(&i.order_id)) {
            return Err(StoreError::NotFound(format!("order {}", orphan.order_id)));
        }

        for item in &items {
            self.line_items
                .entry(item.order_id)
                .or_default()
                .push(item.clone());
        }
        Ok(items)
    }

    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> Result<Order, StoreError> {
        self.check_available()?;
        if Self::take_failure(&self.fail_updates) {
            return Err(StoreError::Database("order update rejected".to_string()));
        }

        let mut order = self
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("order {}", id)))?;
        if let Some(status) = patch.status {
            order.status = status;
        }
        if let Some(payment_status) = patch.payment_status {
            order.payment_status = payment_status;
        }
        if let Some(token) = patch.session_token {
            order.session_token = Some(token);
        }
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        self.check_available()?;
        Ok(self.orders.get(&id).map(|o| o.clone()))
    }

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        self.check_available()?;
        Ok(self
            .by_number
            .get(order_number)
            .and_then(|id| self.orders.get(&*id).map(|o| o.clone())))
    }

    async fn find_order_by_gateway_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        self.check_available()?;
        Ok(self
            .by_gateway_id
            .get(gateway_order_id)
            .and_then(|id| self.orders.get(&*id).map(|o| o.clone())))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        self.check_available()?;
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| filter.matches(o.value()))
            .map(|o| o.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn line_items(&self, order_id: Uuid) -> Result<Vec<OrderLineItem>, StoreError> {
        self.check_available()?;
        Ok(self
            .line_items
            .get(&order_id)
            .map(|items| items.clone())
            .unwrap_or_default())
    }
}

/// Fixed child directory keyed by guardian.
#[derive(Debug, Default)]
pub struct InMemoryChildDirectory {
    children: DashMap<Uuid, Vec<Child>>,
    unavailable: AtomicBool,
}

impl InMemoryChildDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, guardian_id: Uuid, child: Child) {
        self.children.entry(guardian_id).or_default().push(child);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChildDirectory for InMemoryChildDirectory {
    async fn children_for_guardian(&self, guardian_id: Uuid) -> Result<Vec<Child>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database("children unavailable".to_string()));
        }
        Ok(self
            .children
            .get(&guardian_id)
            .map(|c| c.clone())
            .unwrap_or_default())
    }
}
