use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeliveryJobs::EndpointId).uuid().not_null())
                    .col(ColumnDef::new(DeliveryJobs::PayloadId).uuid().not_null())
                    .col(ColumnDef::new(DeliveryJobs::EventType).string().not_null())
                    .col(ColumnDef::new(DeliveryJobs::Body).text().not_null())
                    .col(
                        ColumnDef::new(DeliveryJobs::AttemptNumber)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DeliveryJobs::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(DeliveryJobs::NextAttemptAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(DeliveryJobs::LockedUntil).timestamp_with_time_zone())
                    .col(ColumnDef::new(DeliveryJobs::LastAttemptedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(DeliveryJobs::LastStatusCode).integer())
                    .col(ColumnDef::new(DeliveryJobs::LastError).text())
                    .col(
                        ColumnDef::new(DeliveryJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(DeliveryJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_jobs_status_next_attempt")
                    .table(DeliveryJobs::Table)
                    .col(DeliveryJobs::Status)
                    .col(DeliveryJobs::NextAttemptAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum DeliveryJobs {
    Table,
    Id,
    EndpointId,
    PayloadId,
    EventType,
    Body,
    AttemptNumber,
    Status,
    NextAttemptAt,
    LockedUntil,
    LastAttemptedAt,
    LastStatusCode,
    LastError,
    CreatedAt,
    UpdatedAt,
}
