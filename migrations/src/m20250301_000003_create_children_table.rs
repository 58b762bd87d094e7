use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Children::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Children::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Children::GuardianId).uuid().not_null())
                    .col(ColumnDef::new(Children::Name).string().not_null())
                    .col(ColumnDef::new(Children::ClassName).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_children_guardian_id")
                    .table(Children::Table)
                    .col(Children::GuardianId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Children::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Children {
    Table,
    Id,
    GuardianId,
    Name,
    ClassName,
}
