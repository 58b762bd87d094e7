use dashmap::DashMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::Child;
use crate::repositories::ChildDirectory;

/// Looks up a guardian's children for display on orders.
///
/// Listing surfaces directory failures. Enriching an already-selected child id
/// falls back to the last good listing, then to a placeholder identity, so a
/// directory outage never blocks checkout.
#[derive(Clone)]
pub struct ChildResolver {
    directory: Arc<dyn ChildDirectory>,
    cache: Arc<DashMap<Uuid, Vec<Child>>>,
}

impl ChildResolver {
    pub fn new(directory: Arc<dyn ChildDirectory>) -> Self {
        Self {
            directory,
            cache: Arc::new(DashMap::new()),
        }
    }

    #[instrument(skip(self))]
    pub async fn list_children(&self, guardian_id: Uuid) -> Result<Vec<Child>, ServiceError> {
        let children = self.directory.children_for_guardian(guardian_id).await?;
        self.cache.insert(guardian_id, children.clone());
        Ok(children)
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, guardian_id: Uuid, child_id: Uuid) -> Result<Child, ServiceError> {
        if child_id.is_nil() {
            return Err(ServiceError::ValidationError(
                "select a child for this order".to_string(),
            ));
        }

        let children = match self.list_children(guardian_id).await {
            Ok(children) => children,
            Err(e) => {
                let cached = self
                    .cache
                    .get(&guardian_id)
                    .and_then(|children| children.iter().find(|c| c.id == child_id).cloned());
                return Ok(match cached {
                    Some(child) => {
                        warn!(error = %e, "Child directory unavailable; using cached identity");
                        child
                    }
                    None => {
                        warn!(error = %e, "Child directory unavailable; using placeholder identity");
                        Child::placeholder(child_id)
                    }
                });
            }
        };

        children
            .into_iter()
            .find(|c| c.id == child_id)
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "child {} is not registered to this guardian",
                    child_id
                ))
            })
    }
}
