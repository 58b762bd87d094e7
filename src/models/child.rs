use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::child;

/// Display identity of a child as needed on orders and receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Child {
    pub id: Uuid,
    pub name: String,
    pub class_name: Option<String>,
}

impl Child {
    /// Stand-in identity used when the directory cannot be reached. Only ever
    /// produced for a child id the guardian already selected.
    pub fn placeholder(id: Uuid) -> Self {
        let short = id.simple().to_string();
        Self {
            id,
            name: format!("Child {}", &short[..8]),
            class_name: Some(PLACEHOLDER_CLASS.to_string()),
        }
    }
}

pub const PLACEHOLDER_CLASS: &str = "Unassigned";

impl From<child::Model> for Child {
    fn from(model: child::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            class_name: model.class_name,
        }
    }
}
