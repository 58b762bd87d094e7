use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set, SqlErr,
};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::entities::{
    order::{self, Column, Entity as OrderEntity},
    order_line_item::{self, Entity as LineItemEntity},
    Order, OrderLineItem,
};

use super::{OrderFilter, OrderPatch, OrderStore, StoreError};

/// sea-orm backed order store.
#[derive(Debug, Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

pub(crate) fn map_db_err(err: DbErr) -> StoreError {
    if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
        return StoreError::DuplicateKey(detail);
    }
    match err {
        DbErr::RecordNotFound(detail) => StoreError::NotFound(detail),
        other => StoreError::Database(other.to_string()),
    }
}

fn order_active_model(order: Order) -> order::ActiveModel {
    order::ActiveModel {
        id: Set(order.id),
        order_number: Set(order.order_number),
        gateway_order_id: Set(order.gateway_order_id),
        guardian_id: Set(order.guardian_id),
        child_name: Set(order.child_name),
        child_class: Set(order.child_class),
        total_amount: Set(order.total_amount),
        currency: Set(order.currency),
        status: Set(order.status),
        payment_status: Set(order.payment_status),
        session_token: Set(order.session_token),
        notes: Set(order.notes),
        created_at: Set(order.created_at),
        updated_at: Set(order.updated_at),
    }
}

fn line_item_active_model(item: OrderLineItem) -> order_line_item::ActiveModel {
    order_line_item::ActiveModel {
        id: Set(item.id),
        order_id: Set(item.order_id),
        child_id: Set(item.child_id),
        child_name: Set(item.child_name),
        child_class: Set(item.child_class),
        menu_item_id: Set(item.menu_item_id),
        menu_item_name: Set(item.menu_item_name),
        quantity: Set(item.quantity),
        unit_price: Set(item.unit_price),
        total_price: Set(item.total_price),
        delivery_date: Set(item.delivery_date),
        order_date: Set(item.order_date),
        created_at: Set(item.created_at),
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    #[instrument(skip(self, order), fields(order_number = %order.order_number))]
    async fn insert_order(&self, order: Order) -> Result<Order, StoreError> {
        order_active_model(order)
            .insert(&*self.db)
            .await
            .map_err(map_db_err)
    }

    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn insert_line_items(
        &self,
        items: Vec<OrderLineItem>,
    ) -> Result<Vec<OrderLineItem>, StoreError> {
        if items.is_empty() {
            return Ok(items);
        }

        let models: Vec<_> = items.iter().cloned().map(line_item_active_model).collect();
        LineItemEntity::insert_many(models)
            .exec(&*self.db)
            .await
            .map_err(map_db_err)?;

        debug!("inserted {} line items", items.len());
        Ok(items)
    }

    #[instrument(skip(self))]
    async fn update_order(&self, id: Uuid, patch: OrderPatch) -> Result<Order, StoreError> {
        let existing = OrderEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(map_db_err)?
            .ok_or_else(|| StoreError::NotFound(format!("order {}", id)))?;

        let mut active: order::ActiveModel = existing.into();
        if let Some(status) = patch.status {
            active.status = Set(status);
        }
        if let Some(payment_status) = patch.payment_status {
            active.payment_status = Set(payment_status);
        }
        if let Some(token) = patch.session_token {
            active.session_token = Set(Some(token));
        }
        active.updated_at = Set(Utc::now());

        active.update(&*self.db).await.map_err(map_db_err)
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        OrderEntity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(map_db_err)
    }

    async fn find_order_by_number(&self, order_number: &str) -> Result<Option<Order>, StoreError> {
        OrderEntity::find()
            .filter(Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await
            .map_err(map_db_err)
    }

    async fn find_order_by_gateway_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        OrderEntity::find()
            .filter(Column::GatewayOrderId.eq(gateway_order_id))
            .one(&*self.db)
            .await
            .map_err(map_db_err)
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut query = OrderEntity::find();
        if let Some(guardian_id) = filter.guardian_id {
            query = query.filter(Column::GuardianId.eq(guardian_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status));
        }
        if let Some(payment_status) = filter.payment_status {
            query = query.filter(Column::PaymentStatus.eq(payment_status));
        }
        if let Some(before) = filter.created_before {
            query = query.filter(Column::CreatedAt.lt(before));
        }

        query
            .order_by_desc(Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(map_db_err)
    }

    async fn line_items(&self, order_id: Uuid) -> Result<Vec<OrderLineItem>, StoreError> {
        LineItemEntity::find()
            .filter(order_line_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_line_item::Column::DeliveryDate)
            .all(&*self.db)
            .await
            .map_err(map_db_err)
    }
}
