use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{batch::BatchEntry, cart::CartLine, child::Child};

/// The shape shared by a plain cart checkout and a flattened batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderableLine {
    pub child_id: Uuid,
    pub child_name: String,
    pub child_class: Option<String>,
    pub menu_item_id: Uuid,
    pub menu_item_name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub delivery_date: NaiveDate,
}

impl OrderableLine {
    pub fn from_cart_line(line: &CartLine, child: &Child) -> Self {
        Self {
            child_id: child.id,
            child_name: child.name.clone(),
            child_class: child.class_name.clone(),
            menu_item_id: line.menu_item_id,
            menu_item_name: line.menu_item_name.clone(),
            unit_price: line.unit_price,
            quantity: line.quantity,
            delivery_date: line.delivery_date,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Concatenates every entry's lines, each line keeping the identity of the
/// child it was committed for.
pub fn flatten_batch(entries: &[BatchEntry]) -> Vec<OrderableLine> {
    entries
        .iter()
        .flat_map(|entry| {
            entry.lines.iter().map(move |line| OrderableLine {
                child_id: entry.child_id,
                child_name: entry.child_name.clone(),
                child_class: entry.child_class.clone(),
                menu_item_id: line.menu_item_id,
                menu_item_name: line.menu_item_name.clone(),
                unit_price: line.unit_price,
                quantity: line.quantity,
                delivery_date: line.delivery_date,
            })
        })
        .collect()
}

/// Payer details forwarded to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CustomerDetails {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 20))]
    pub phone: Option<String>,
}

impl CustomerDetails {
    pub fn new(name: Option<String>, email: impl Into<String>, phone: Option<String>) -> Self {
        Self {
            name: name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Customer".to_string()),
            email: email.into(),
            phone: phone.filter(|p| !p.trim().is_empty()),
        }
    }
}

/// The account holder placing orders on behalf of children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guardian {
    pub id: Uuid,
    pub customer: CustomerDetails,
}
