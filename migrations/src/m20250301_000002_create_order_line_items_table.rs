use sea_orm_migration::prelude::*;

use super::m20250301_000001_create_orders_table::Orders;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OrderLineItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OrderLineItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderLineItems::OrderId).uuid().not_null())
                    .col(ColumnDef::new(OrderLineItems::ChildId).uuid().not_null())
                    .col(ColumnDef::new(OrderLineItems::ChildName).string().not_null())
                    .col(ColumnDef::new(OrderLineItems::ChildClass).string().null())
                    .col(ColumnDef::new(OrderLineItems::MenuItemId).uuid().not_null())
                    .col(
                        ColumnDef::new(OrderLineItems::MenuItemName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderLineItems::Quantity).integer().not_null())
                    .col(
                        ColumnDef::new(OrderLineItems::UnitPrice)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OrderLineItems::TotalPrice)
                            .decimal_len(19, 4)
                            .not_null(),
                    )
                    .col(ColumnDef::new(OrderLineItems::DeliveryDate).date().not_null())
                    .col(ColumnDef::new(OrderLineItems::OrderDate).date().not_null())
                    .col(
                        ColumnDef::new(OrderLineItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_line_items_order_id")
                            .from(OrderLineItems::Table, OrderLineItems::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_line_items_order_id")
                    .table(OrderLineItems::Table)
                    .col(OrderLineItems::OrderId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OrderLineItems::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OrderLineItems {
    Table,
    Id,
    OrderId,
    ChildId,
    ChildName,
    ChildClass,
    MenuItemId,
    MenuItemName,
    Quantity,
    UnitPrice,
    TotalPrice,
    DeliveryDate,
    OrderDate,
    CreatedAt,
}
