//! Server-to-server payment notifications.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::str::FromStr;

/// Body the gateway POSTs when a transaction changes state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayNotification {
    pub order_id: String,
    pub status_code: String,
    pub gross_amount: String,
    pub signature_key: String,
    pub transaction_status: String,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
}

/// Payment verdict carried by a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationStatus {
    Success,
    Pending,
    Failed,
    Unrecognized(String),
}

impl GatewayNotification {
    pub fn status(&self) -> NotificationStatus {
        let fraud = self.fraud_status.as_deref().unwrap_or("accept");
        match self.transaction_status.as_str() {
            "capture" => match fraud {
                "accept" => NotificationStatus::Success,
                "challenge" => NotificationStatus::Pending,
                "deny" => NotificationStatus::Failed,
                other => NotificationStatus::Unrecognized(format!("capture/{}", other)),
            },
            "settlement" => NotificationStatus::Success,
            "pending" => NotificationStatus::Pending,
            "deny" | "cancel" | "expire" | "failure" => NotificationStatus::Failed,
            other => NotificationStatus::Unrecognized(other.to_string()),
        }
    }

    pub fn gross_amount(&self) -> Option<Decimal> {
        Decimal::from_str(self.gross_amount.trim()).ok()
    }

    pub fn expected_signature(&self, server_key: &str) -> String {
        let mut hasher = Sha512::new();
        hasher.update(self.order_id.as_bytes());
        hasher.update(self.status_code.as_bytes());
        hasher.update(self.gross_amount.as_bytes());
        hasher.update(server_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify_signature(&self, server_key: &str) -> bool {
        constant_time_eq(
            &self.expected_signature(server_key),
            &self.signature_key.to_ascii_lowercase(),
        )
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
