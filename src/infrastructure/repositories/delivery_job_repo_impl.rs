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

use crate::domain::models::delivery::{lease_deadline, DeliveryJob};
use crate::domain::models::event::{EventType, SerializedPayload};
use crate::domain::repositories::delivery_job_repository::DeliveryJobRepository;
use crate::domain::repositories::RepositoryError;
use crate::infrastructure::database::entities::delivery_job;
use crate::infrastructure::database::entities::sea_orm_active_enums::SeaDeliveryStatus;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::*;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// 投递任务仓库实现
#[derive(Clone)]
pub struct DeliveryJobRepoImpl {
    db: Arc<DatabaseConnection>,
}

impl DeliveryJobRepoImpl {
    /// 创建新的投递任务仓库实现
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 可被认领的任务：退避已到期，或认领租约已过期（持有者崩溃）
    fn claimable(now: DateTimeWithTimeZone) -> Condition {
        Condition::any()
            .add(
                Condition::all()
                    .add(delivery_job::Column::Status.eq(SeaDeliveryStatus::RetryScheduled))
                    .add(delivery_job::Column::NextAttemptAt.lte(now)),
            )
            .add(
                Condition::all()
                    .add(delivery_job::Column::Status.eq(SeaDeliveryStatus::InFlight))
                    .add(delivery_job::Column::LockedUntil.lte(now)),
            )
    }

    /// 仍由持有 `lease` 的工作器占用的任务
    fn held(id: Uuid, lease: DateTimeWithTimeZone) -> Condition {
        Condition::all()
            .add(delivery_job::Column::Id.eq(id))
            .add(delivery_job::Column::Status.eq(SeaDeliveryStatus::InFlight))
            .add(delivery_job::Column::LockedUntil.eq(lease))
    }

    /// 把无法读取的任务标记为失败，避免它在每次租约到期后被反复认领
    async fn quarantine(&self, id: Uuid, reason: &str) {
        let result = delivery_job::Entity::update_many()
            .col_expr(
                delivery_job::Column::Status,
                Expr::value(SeaDeliveryStatus::Failed.to_value()),
            )
            .col_expr(
                delivery_job::Column::LastError,
                Expr::value(format!("unreadable delivery job: {}", reason)),
            )
            .col_expr(
                delivery_job::Column::LockedUntil,
                Expr::value(Option::<DateTimeWithTimeZone>::None),
            )
            .filter(delivery_job::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await;

        if let Err(e) = result {
            error!(job_id = %id, error = %e, "Failed to quarantine delivery job");
        }
    }
}

#[async_trait]
impl DeliveryJobRepository for DeliveryJobRepoImpl {
    async fn create(&self, job: &DeliveryJob) -> Result<DeliveryJob, RepositoryError> {
        let active_model = delivery_job::ActiveModel::try_from(job)?;

        delivery_job::Entity::insert(active_model)
            .exec(self.db.as_ref())
            .await?;

        Ok(job.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DeliveryJob>, RepositoryError> {
        let model = delivery_job::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;

        model.map(DeliveryJob::try_from).transpose()
    }

    async fn find_by_endpoint(&self, endpoint_id: Uuid) -> Result<Vec<DeliveryJob>, RepositoryError> {
        let models = delivery_job::Entity::find()
            .filter(delivery_job::Column::EndpointId.eq(endpoint_id))
            .order_by_asc(delivery_job::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;

        models.into_iter().map(DeliveryJob::try_from).collect()
    }

    async fn update(&self, job: &DeliveryJob) -> Result<DeliveryJob, RepositoryError> {
        let mut active: delivery_job::ActiveModel = delivery_job::Entity::find_by_id(job.id)
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?
            .into();

        active.attempt_number = Set(to_i32(job.attempt_number)?);
        active.status = Set(job.status.into());
        active.next_attempt_at = Set(job.next_attempt_at.map(Into::into));
        active.locked_until = Set(job.locked_until.map(Into::into));
        active.last_attempted_at = Set(job.last_attempted_at.map(Into::into));
        active.last_status_code = Set(job.last_status_code.map(i32::from));
        active.last_error = Set(job.last_error.clone());
        active.updated_at = Set(job.updated_at.into());

        let updated_model = active.update(self.db.as_ref()).await?;

        DeliveryJob::try_from(updated_model)
    }

    async fn update_claimed(
        &self,
        job: &DeliveryJob,
        lease: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let status: SeaDeliveryStatus = job.status.into();
        let next_attempt_at: Option<DateTimeWithTimeZone> = job.next_attempt_at.map(Into::into);
        let locked_until: Option<DateTimeWithTimeZone> = job.locked_until.map(Into::into);
        let last_attempted_at: Option<DateTimeWithTimeZone> = job.last_attempted_at.map(Into::into);
        let updated_at: DateTimeWithTimeZone = job.updated_at.into();

        let result = delivery_job::Entity::update_many()
            .col_expr(
                delivery_job::Column::AttemptNumber,
                Expr::value(to_i32(job.attempt_number)?),
            )
            .col_expr(delivery_job::Column::Status, Expr::value(status.to_value()))
            .col_expr(delivery_job::Column::NextAttemptAt, Expr::value(next_attempt_at))
            .col_expr(delivery_job::Column::LockedUntil, Expr::value(locked_until))
            .col_expr(delivery_job::Column::LastAttemptedAt, Expr::value(last_attempted_at))
            .col_expr(
                delivery_job::Column::LastStatusCode,
                Expr::value(job.last_status_code.map(i32::from)),
            )
            .col_expr(delivery_job::Column::LastError, Expr::value(job.last_error.clone()))
            .col_expr(delivery_job::Column::UpdatedAt, Expr::value(updated_at))
            .filter(Self::held(job.id, lease.into()))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected != 1 {
            debug!(job_id = %job.id, "Delivery job lease lost before write-back");
            return Ok(false);
        }
        Ok(true)
    }

    async fn renew_lease(
        &self,
        id: Uuid,
        current: DateTime<Utc>,
        renewed: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let renewed: DateTimeWithTimeZone = renewed.into();

        let result = delivery_job::Entity::update_many()
            .col_expr(delivery_job::Column::LockedUntil, Expr::value(renewed))
            .filter(Self::held(id, current.into()))
            .exec(self.db.as_ref())
            .await?;

        Ok(result.rows_affected == 1)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
        lease: Duration,
    ) -> Result<Vec<DeliveryJob>, RepositoryError> {
        let now_tz: DateTimeWithTimeZone = now.into();
        let locked_until: DateTimeWithTimeZone = lease_deadline(now, lease).into();

        let candidates = delivery_job::Entity::find()
            .filter(Self::claimable(now_tz))
            .order_by_asc(delivery_job::Column::NextAttemptAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for mut model in candidates {
            // The claimable filter is re-checked in the UPDATE so only one claimer wins.
            let result = delivery_job::Entity::update_many()
                .col_expr(
                    delivery_job::Column::Status,
                    Expr::value(SeaDeliveryStatus::InFlight.to_value()),
                )
                .col_expr(delivery_job::Column::LockedUntil, Expr::value(locked_until))
                .col_expr(delivery_job::Column::UpdatedAt, Expr::value(now_tz))
                .filter(delivery_job::Column::Id.eq(model.id))
                .filter(Self::claimable(now_tz))
                .exec(self.db.as_ref())
                .await?;

            if result.rows_affected != 1 {
                debug!(job_id = %model.id, "Delivery job claimed by another worker");
                continue;
            }

            model.status = SeaDeliveryStatus::InFlight;
            model.locked_until = Some(locked_until);
            model.updated_at = now_tz;

            let id = model.id;
            match DeliveryJob::try_from(model) {
                Ok(job) => claimed.push(job),
                Err(e) => {
                    error!(job_id = %id, error = %e, "Claimed an unreadable delivery job");
                    self.quarantine(id, &e.to_string()).await;
                }
            }
        }

        Ok(claimed)
    }
}

impl TryFrom<&DeliveryJob> for delivery_job::ActiveModel {
    type Error = RepositoryError;

    fn try_from(job: &DeliveryJob) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Set(job.id),
            endpoint_id: Set(job.endpoint_id),
            payload_id: Set(job.payload.id),
            event_type: Set(job.payload.event.to_string()),
            body: Set(job.payload.body.clone()),
            attempt_number: Set(to_i32(job.attempt_number)?),
            status: Set(job.status.into()),
            next_attempt_at: Set(job.next_attempt_at.map(Into::into)),
            locked_until: Set(job.locked_until.map(Into::into)),
            last_attempted_at: Set(job.last_attempted_at.map(Into::into)),
            last_status_code: Set(job.last_status_code.map(i32::from)),
            last_error: Set(job.last_error.clone()),
            created_at: Set(job.created_at.into()),
            updated_at: Set(job.updated_at.into()),
        })
    }
}

impl TryFrom<delivery_job::Model> for DeliveryJob {
    type Error = RepositoryError;

    fn try_from(model: delivery_job::Model) -> Result<Self, Self::Error> {
        let event = model
            .event_type
            .parse::<EventType>()
            .map_err(|e| RepositoryError::InvalidRecord(e.to_string()))?;
        let attempt_number = u32::try_from(model.attempt_number)
            .map_err(|_| RepositoryError::InvalidRecord("attempt_number is negative".to_string()))?;
        let last_status_code = model
            .last_status_code
            .map(u16::try_from)
            .transpose()
            .map_err(|_| RepositoryError::InvalidRecord("last_status_code out of range".to_string()))?;

        Ok(Self {
            id: model.id,
            endpoint_id: model.endpoint_id,
            payload: SerializedPayload {
                id: model.payload_id,
                event,
                body: model.body,
            },
            attempt_number,
            status: model.status.into(),
            next_attempt_at: model.next_attempt_at.map(Into::into),
            locked_until: model.locked_until.map(Into::into),
            last_attempted_at: model.last_attempted_at.map(Into::into),
            last_status_code,
            last_error: model.last_error,
            created_at: model.created_at.into(),
            updated_at: model.updated_at.into(),
        })
    }
}

fn to_i32(attempt_number: u32) -> Result<i32, RepositoryError> {
    i32::try_from(attempt_number)
        .map_err(|_| RepositoryError::InvalidRecord("attempt_number out of range".to_string()))
}
