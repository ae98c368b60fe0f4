// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::endpoint::{
    EndpointStats, EndpointStatus, RetryPolicy, StatsDelta, WebhookEndpoint,
};
use crate::domain::models::event::EventType;
use crate::domain::repositories::endpoint_repository::EndpointRepository;
use crate::domain::repositories::RepositoryError;
use crate::infrastructure::database::entities::sea_orm_active_enums::SeaEndpointStatus;
use crate::infrastructure::database::entities::webhook_endpoint;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Webhook端点仓库实现
#[derive(Clone)]
pub struct EndpointRepoImpl {
    db: Arc<DatabaseConnection>,
}

impl EndpointRepoImpl {
    /// 创建新的端点仓库实现
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EndpointRepository for EndpointRepoImpl {
    async fn create(&self, endpoint: &WebhookEndpoint) -> Result<WebhookEndpoint, RepositoryError> {
        let active_model = webhook_endpoint::ActiveModel::try_from(endpoint)?;

        webhook_endpoint::Entity::insert(active_model)
            .exec(self.db.as_ref())
            .await?;

        Ok(endpoint.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, RepositoryError> {
        let model = webhook_endpoint::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        model.map(WebhookEndpoint::try_from).transpose()
    }

    async fn find_active_endpoints(
        &self,
        event: EventType,
        tenant_id: Option<&str>,
    ) -> Result<Vec<WebhookEndpoint>, RepositoryError> {
        let mut query = webhook_endpoint::Entity::find()
            .filter(webhook_endpoint::Column::Status.eq(SeaEndpointStatus::Active));

        if let Some(tenant_id) = tenant_id {
            query = query.filter(webhook_endpoint::Column::TenantId.eq(tenant_id));
        }

        let models = query
            .order_by_asc(webhook_endpoint::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        // Subscriptions are a JSON column with no portable containment operator
        // across SQLite and Postgres, so event membership is filtered in-process.
        // Only status and tenant narrow the query; without a tenant every active
        // endpoint is loaded and this cost grows with the endpoint count.
        let endpoints = models
            .into_iter()
            .filter_map(|model| {
                let id = model.id;
                match WebhookEndpoint::try_from(model) {
                    Ok(endpoint) => Some(endpoint),
                    Err(e) => {
                        warn!(endpoint_id = %id, error = %e, "Skipping unreadable webhook endpoint");
                        None
                    }
                }
            })
            .filter(|endpoint| endpoint.subscribed_events.contains(&event))
            .collect();

        Ok(endpoints)
    }

    async fn update_stats(&self, id: Uuid, delta: StatsDelta) -> Result<(), RepositoryError> {
        let update = webhook_endpoint::Entity::update_many()
            .filter(webhook_endpoint::Column::Id.eq(id))
            .col_expr(
                webhook_endpoint::Column::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            );

        // Counters are incremented in SQL so concurrent deliveries never lose updates.
        let update = match delta {
            StatsDelta::Delivered { at } => update
                .col_expr(
                    webhook_endpoint::Column::DeliveredCount,
                    Expr::col(webhook_endpoint::Column::DeliveredCount).add(1),
                )
                .col_expr(
                    webhook_endpoint::Column::LastDeliveredAt,
                    Expr::value(DateTimeWithTimeZone::from(at)),
                ),
            StatsDelta::Failed { at, error } => update
                .col_expr(
                    webhook_endpoint::Column::FailedCount,
                    Expr::col(webhook_endpoint::Column::FailedCount).add(1),
                )
                .col_expr(
                    webhook_endpoint::Column::LastFailedAt,
                    Expr::value(DateTimeWithTimeZone::from(at)),
                )
                .col_expr(webhook_endpoint::Column::LastError, Expr::value(error)),
        };

        let result = update.exec(self.db.as_ref()).await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: EndpointStatus) -> Result<(), RepositoryError> {
        let result = webhook_endpoint::Entity::update_many()
            .col_expr(
                webhook_endpoint::Column::Status,
                Expr::value(SeaEndpointStatus::from(status).to_value()),
            )
            .col_expr(
                webhook_endpoint::Column::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(webhook_endpoint::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}

impl TryFrom<&WebhookEndpoint> for webhook_endpoint::ActiveModel {
    type Error = RepositoryError;

    fn try_from(endpoint: &WebhookEndpoint) -> Result<Self, Self::Error> {
        let subscribed_events = serde_json::to_value(&endpoint.subscribed_events)
            .map_err(|e| RepositoryError::InvalidRecord(e.to_string()))?;
        let custom_headers = serde_json::to_value(&endpoint.custom_headers)
            .map_err(|e| RepositoryError::InvalidRecord(e.to_string()))?;

        Ok(Self {
            id: Set(endpoint.id),
            tenant_id: Set(endpoint.tenant_id.clone()),
            url: Set(endpoint.url.clone()),
            secret: Set(endpoint.secret.clone()),
            subscribed_events: Set(subscribed_events),
            custom_headers: Set(custom_headers),
            max_retries: Set(to_i32(endpoint.retry_policy.max_retries, "max_retries")?),
            retry_delay_seconds: Set(to_i32(
                endpoint.retry_policy.retry_delay_seconds,
                "retry_delay_seconds",
            )?),
            status: Set(endpoint.status.into()),
            delivered_count: Set(to_i64(endpoint.stats.delivered_count, "delivered_count")?),
            failed_count: Set(to_i64(endpoint.stats.failed_count, "failed_count")?),
            last_delivered_at: Set(endpoint.stats.last_delivered_at.map(Into::into)),
            last_failed_at: Set(endpoint.stats.last_failed_at.map(Into::into)),
            last_error: Set(endpoint.stats.last_error.clone()),
            created_at: Set(endpoint.created_at.into()),
            updated_at: Set(endpoint.updated_at.into()),
        })
    }
}

impl TryFrom<webhook_endpoint::Model> for WebhookEndpoint {
    type Error = RepositoryError;

    fn try_from(model: webhook_endpoint::Model) -> Result<Self, Self::Error> {
        let event_names: Vec<String> = serde_json::from_value(model.subscribed_events)
            .map_err(|e| RepositoryError::InvalidRecord(format!("subscribed_events: {}", e)))?;
        // An event type that no longer exists only drops that subscription.
        let subscribed_events = event_names
            .iter()
            .filter_map(|name| match name.parse::<EventType>() {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(endpoint_id = %model.id, error = %e, "Ignoring unknown subscription");
                    None
                }
            })
            .collect();
        let custom_headers: Vec<(String, String)> = serde_json::from_value(model.custom_headers)
            .map_err(|e| RepositoryError::InvalidRecord(format!("custom_headers: {}", e)))?;

        Ok(Self {
            id: model.id,
            tenant_id: model.tenant_id,
            url: model.url,
            secret: model.secret,
            subscribed_events,
            custom_headers,
            retry_policy: RetryPolicy {
                max_retries: from_i32(model.max_retries, "max_retries")?,
                retry_delay_seconds: from_i32(model.retry_delay_seconds, "retry_delay_seconds")?,
            },
            status: model.status.into(),
            stats: EndpointStats {
                delivered_count: from_i64(model.delivered_count, "delivered_count")?,
                failed_count: from_i64(model.failed_count, "failed_count")?,
                last_delivered_at: model.last_delivered_at.map(Into::into),
                last_failed_at: model.last_failed_at.map(Into::into),
                last_error: model.last_error,
            },
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }
}

fn to_i32(value: u32, field: &str) -> Result<i32, RepositoryError> {
    i32::try_from(value).map_err(|_| RepositoryError::InvalidRecord(format!("{} out of range", field)))
}

fn to_i64(value: u64, field: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value).map_err(|_| RepositoryError::InvalidRecord(format!("{} out of range", field)))
}

fn from_i32(value: i32, field: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::InvalidRecord(format!("{} is negative", field)))
}

fn from_i64(value: i64, field: &str) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::InvalidRecord(format!("{} is negative", field)))
}
