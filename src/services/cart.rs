use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{CartLine, LineId, MenuItem};

/// Lines the guardian has picked but not yet committed to an order or batch.
///
/// Lines keep insertion order. Re-adding the same menu item for the same child
/// on the same date merges into the existing line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartStore {
    lines: Vec<CartLine>,
}

impl CartStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` of `item` for `child_id` on `delivery_date`.
    pub fn add(
        &mut self,
        item: &MenuItem,
        child_id: Uuid,
        delivery_date: NaiveDate,
        quantity: u32,
    ) -> Result<&CartLine, ServiceError> {
        if child_id.is_nil() {
            return Err(ServiceError::ValidationError(
                "select a child before adding to the cart".to_string(),
            ));
        }
        if quantity == 0 {
            return Err(ServiceError::ValidationError(
                "quantity must be at least 1".to_string(),
            ));
        }
        if item.price.is_sign_negative() {
            return Err(ServiceError::ValidationError(format!(
                "menu item {} has a negative price",
                item.id
            )));
        }

        let line_id = LineId::derive(item.id, delivery_date, child_id);
        let index = match self.position(&line_id) {
            Some(index) => {
                let line = &mut self.lines[index];
                line.quantity = line.quantity.saturating_add(quantity);
                index
            }
            None => {
                self.lines.push(CartLine {
                    line_id,
                    menu_item_id: item.id,
                    menu_item_name: item.name.clone(),
                    child_id,
                    unit_price: item.price,
                    quantity,
                    delivery_date,
                });
                self.lines.len() - 1
            }
        };
        Ok(&self.lines[index])
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn set_quantity(&mut self, line_id: &LineId, quantity: u32) -> Result<(), ServiceError> {
        let index = self
            .position(line_id)
            .ok_or_else(|| ServiceError::NotFound(format!("cart line {}", line_id)))?;
        if quantity == 0 {
            self.lines.remove(index);
        } else {
            self.lines[index].quantity = quantity;
        }
        Ok(())
    }

    pub fn remove(&mut self, line_id: &LineId) -> Option<CartLine> {
        self.position(line_id).map(|index| self.lines.remove(index))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Number of portions across all lines.
    pub fn count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |acc, line| acc.saturating_add(line.quantity))
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn quantity_of(&self, menu_item_id: Uuid, child_id: Uuid, delivery_date: NaiveDate) -> u32 {
        let line_id = LineId::derive(menu_item_id, delivery_date, child_id);
        self.position(&line_id)
            .map(|index| self.lines[index].quantity)
            .unwrap_or(0)
    }

    fn position(&self, line_id: &LineId) -> Option<usize> {
        self.lines.iter().position(|line| &line.line_id == line_id)
    }
}
