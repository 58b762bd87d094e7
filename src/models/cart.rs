use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Deterministic identity of a cart line: the same menu item for the same
/// child on the same date always maps to the same line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(String);

impl LineId {
    pub fn derive(menu_item_id: Uuid, delivery_date: NaiveDate, child_id: Uuid) -> Self {
        Self(format!(
            "{}-{}-{}",
            menu_item_id,
            delivery_date.format("%Y-%m-%d"),
            child_id
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Catalog entry as offered on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
}

/// A selected-but-uncommitted menu item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub line_id: LineId,
    pub menu_item_id: Uuid,
    pub menu_item_name: String,
    pub child_id: Uuid,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub delivery_date: NaiveDate,
}

impl CartLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}
