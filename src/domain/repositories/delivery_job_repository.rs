// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::RepositoryError;
use crate::domain::models::delivery::DeliveryJob;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// 投递任务仓库特质
///
/// 定义持久化重试队列的数据访问接口
#[async_trait]
pub trait DeliveryJobRepository: Send + Sync {
    /// 创建投递任务
    async fn create(&self, job: &DeliveryJob) -> Result<DeliveryJob, RepositoryError>;
    /// 根据ID查找投递任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<DeliveryJob>, RepositoryError>;
    /// 查找某个端点的全部投递任务，按创建时间排序
    async fn find_by_endpoint(&self, endpoint_id: Uuid) -> Result<Vec<DeliveryJob>, RepositoryError>;
    /// 更新投递任务
    async fn update(&self, job: &DeliveryJob) -> Result<DeliveryJob, RepositoryError>;
    /// 以认领租约为条件写回任务
    ///
    /// 仅当任务仍为 `in_flight` 且 `locked_until` 等于 `lease` 时更新。
    /// 返回 `false` 表示租约已过期并被其他工作器重新认领。
    async fn update_claimed(
        &self,
        job: &DeliveryJob,
        lease: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    /// 续租：把 `locked_until` 从 `current` 推迟到 `renewed`
    async fn renew_lease(
        &self,
        id: Uuid,
        current: DateTime<Utc>,
        renewed: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    /// 认领到期的投递任务
    ///
    /// 返回的任务状态为 `in_flight`，租约在 `now + lease` 到期。
    /// 同一任务不会被两个调用者同时认领。
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
        lease: Duration,
    ) -> Result<Vec<DeliveryJob>, RepositoryError>;
}
