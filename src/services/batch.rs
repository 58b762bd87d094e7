use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use super::cart::CartStore;
use crate::errors::ServiceError;
use crate::models::{BatchEntry, CartLine, Child};

/// Per-child carts waiting to be paid together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchAggregator {
    entries: Vec<BatchEntry>,
}

impl BatchAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freezes `lines` as one entry for `child`.
    pub fn commit(
        &mut self,
        child: &Child,
        lines: &[CartLine],
        notes: Option<String>,
    ) -> Result<&BatchEntry, ServiceError> {
        if child.id.is_nil() {
            return Err(ServiceError::ValidationError(
                "select a child for this batch entry".to_string(),
            ));
        }
        if lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "cannot add an empty cart to the batch".to_string(),
            ));
        }
        if let Some(stray) = lines.iter().find(|line| line.child_id != child.id) {
            return Err(ServiceError::ValidationError(format!(
                "cart line {} belongs to a different child",
                stray.line_id
            )));
        }

        let lines = lines.to_vec();
        let computed_total = lines.iter().map(CartLine::line_total).sum();
        self.entries.push(BatchEntry {
            id: Uuid::new_v4(),
            child_id: child.id,
            child_name: child.name.clone(),
            child_class: child.class_name.clone(),
            lines,
            notes: notes.filter(|n| !n.trim().is_empty()),
            computed_total,
            created_at: Utc::now(),
        });

        let last = self.entries.len() - 1;
        Ok(&self.entries[last])
    }

    /// Commits the whole cart for `child` and empties the cart on success.
    pub fn commit_child_cart(
        &mut self,
        child: &Child,
        cart: &mut CartStore,
        notes: Option<String>,
    ) -> Result<&BatchEntry, ServiceError> {
        let index = self.entries.len();
        self.commit(child, cart.lines(), notes)?;
        cart.clear();
        Ok(&self.entries[index])
    }

    pub fn remove_entry(&mut self, entry_id: Uuid) -> Option<BatchEntry> {
        let index = self.entries.iter().position(|e| e.id == entry_id)?;
        Some(self.entries.remove(index))
    }

    pub fn total_amount(&self) -> Decimal {
        self.entries.iter().map(|e| e.computed_total).sum()
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
