use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::child::{Column, Entity as ChildEntity};
use crate::models::Child;

use super::{order_repository::map_db_err, ChildDirectory, StoreError};

/// Reads children from the `children` table.
#[derive(Debug, Clone)]
pub struct SeaOrmChildDirectory {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmChildDirectory {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChildDirectory for SeaOrmChildDirectory {
    async fn children_for_guardian(&self, guardian_id: Uuid) -> Result<Vec<Child>, StoreError> {
        let rows = ChildEntity::find()
            .filter(Column::GuardianId.eq(guardian_id))
            .order_by_asc(Column::Name)
            .all(&*self.db)
            .await
            .map_err(map_db_err)?;

        Ok(rows.into_iter().map(Child::from).collect())
    }
}
