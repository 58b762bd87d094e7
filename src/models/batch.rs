use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cart::CartLine;

/// One child's cart, frozen at the moment it was committed to the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub id: Uuid,
    pub child_id: Uuid,
    pub child_name: String,
    pub child_class: Option<String>,
    pub lines: Vec<CartLine>,
    pub notes: Option<String>,
    pub computed_total: Decimal,
    pub created_at: DateTime<Utc>,
}
