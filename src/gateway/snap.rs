use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{GatewayError, PaymentGateway, SessionGrant, SessionRequest, SessionToken};
use crate::config::AppConfig;

const TRANSACTIONS_PATH: &str = "/snap/v1/transactions";
/// Longest item name the gateway accepts.
const MAX_ITEM_NAME_CHARS: usize = 50;

/// HTTP client for a Snap-style hosted payment page.
#[derive(Clone)]
pub struct SnapGateway {
    client: reqwest::Client,
    base_url: String,
    server_key: String,
}

impl SnapGateway {
    pub fn new(
        base_url: impl Into<String>,
        server_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            server_key: server_key.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        Self::new(
            config.gateway_base_url.clone(),
            config.gateway_server_key.clone(),
            config.gateway_timeout(),
        )
    }

    fn authorization(&self) -> String {
        format!("Basic {}", STANDARD.encode(format!("{}:", self.server_key)))
    }
}

#[derive(Debug, Serialize)]
struct SnapTransactionRequest {
    transaction_details: TransactionDetails,
    customer_details: CustomerPayload,
    item_details: Vec<ItemPayload>,
}

#[derive(Debug, Serialize)]
struct TransactionDetails {
    order_id: String,
    gross_amount: i64,
}

#[derive(Debug, Serialize)]
struct CustomerPayload {
    first_name: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
}

#[derive(Debug, Serialize)]
struct ItemPayload {
    id: String,
    price: i64,
    quantity: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SnapTransactionResponse {
    #[serde(default)]
    token: String,
    #[serde(default)]
    redirect_url: Option<String>,
}

fn whole_amount(amount: Decimal) -> Result<i64, GatewayError> {
    amount
        .round()
        .to_i64()
        .ok_or_else(|| GatewayError::InvalidRequest(format!("amount {} out of range", amount)))
}

impl TryFrom<&SessionRequest> for SnapTransactionRequest {
    type Error = GatewayError;

    fn try_from(request: &SessionRequest) -> Result<Self, Self::Error> {
        let item_details = request
            .items
            .iter()
            .map(|item| {
                Ok(ItemPayload {
                    id: item.id.clone(),
                    price: whole_amount(item.price)?,
                    quantity: item.quantity,
                    name: item.name.chars().take(MAX_ITEM_NAME_CHARS).collect(),
                })
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;

        let gross_amount = whole_amount(request.gross_amount)?;
        let items_total: i64 = item_details
            .iter()
            .map(|i| i.price * i64::from(i.quantity))
            .sum();
        if items_total != gross_amount {
            return Err(GatewayError::InvalidRequest(format!(
                "item total {} does not match gross amount {}",
                items_total, gross_amount
            )));
        }

        Ok(Self {
            transaction_details: TransactionDetails {
                order_id: request.gateway_order_id.clone(),
                gross_amount,
            },
            customer_details: CustomerPayload {
                first_name: request.customer.name.clone(),
                email: request.customer.email.clone(),
                phone: request.customer.phone.clone(),
            },
            item_details,
        })
    }
}

#[async_trait]
impl PaymentGateway for SnapGateway {
    #[instrument(skip(self, request), fields(order_id = %request.gateway_order_id))]
    async fn create_session(&self, request: &SessionRequest) -> Result<SessionGrant, GatewayError> {
        let body = SnapTransactionRequest::try_from(request)?;
        let url = format!("{}{}", self.base_url, TRANSACTIONS_PATH);

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.authorization())
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Gateway rejected session request");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let payload: SnapTransactionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        if payload.token.trim().is_empty() {
            return Err(GatewayError::InvalidResponse(
                "response carried no token".to_string(),
            ));
        }

        info!("Gateway session created");
        Ok(SessionGrant {
            token: SessionToken::new(payload.token),
            redirect_url: payload.redirect_url,
        })
    }
}
