use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookEndpoints::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookEndpoints::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WebhookEndpoints::TenantId).string())
                    .col(ColumnDef::new(WebhookEndpoints::Url).string().not_null())
                    .col(ColumnDef::new(WebhookEndpoints::Secret).string())
                    .col(
                        ColumnDef::new(WebhookEndpoints::SubscribedEvents)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::CustomHeaders)
                            .json()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::RetryDelaySeconds)
                            .integer()
                            .not_null()
                            .default(60),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::Status)
                            .string_len(20)
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::DeliveredCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::FailedCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(WebhookEndpoints::LastDeliveredAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(WebhookEndpoints::LastFailedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(WebhookEndpoints::LastError).text())
                    .col(
                        ColumnDef::new(WebhookEndpoints::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(WebhookEndpoints::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Matcher reads by status + tenant
        manager
            .create_index(
                Index::create()
                    .name("idx_webhook_endpoints_status_tenant")
                    .table(WebhookEndpoints::Table)
                    .col(WebhookEndpoints::Status)
                    .col(WebhookEndpoints::TenantId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WebhookEndpoints::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WebhookEndpoints {
    Table,
    Id,
    TenantId,
    Url,
    Secret,
    SubscribedEvents,
    CustomHeaders,
    MaxRetries,
    RetryDelaySeconds,
    Status,
    DeliveredCount,
    FailedCount,
    LastDeliveredAt,
    LastFailedAt,
    LastError,
    CreatedAt,
    UpdatedAt,
}
