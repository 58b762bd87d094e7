pub mod health;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Header carrying the signed-in guardian's id, set by the upstream session layer.
pub const GUARDIAN_HEADER: &str = "x-guardian-id";

/// Guardian on whose behalf the request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardianId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for GuardianId
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(GUARDIAN_HEADER)
            .ok_or_else(|| ServiceError::Unauthorized(format!("missing {} header", GUARDIAN_HEADER)))?
            .to_str()
            .map_err(|_| ServiceError::Unauthorized("malformed guardian id".to_string()))?;

        let id = Uuid::parse_str(raw.trim())
            .map_err(|_| ServiceError::Unauthorized("malformed guardian id".to_string()))?;
        if id.is_nil() {
            return Err(ServiceError::Unauthorized("malformed guardian id".to_string()));
        }
        Ok(GuardianId(id))
    }
}
