// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::RepositoryError;
use crate::domain::models::endpoint::{EndpointStatus, StatsDelta, WebhookEndpoint};
use crate::domain::models::event::EventType;
use async_trait::async_trait;
use uuid::Uuid;

/// 端点仓库特质
///
/// 端点的增删改查属于外部协作者；这里只暴露分发所需的读取与统计更新。
#[async_trait]
pub trait EndpointRepository: Send + Sync {
    /// 创建端点
    async fn create(&self, endpoint: &WebhookEndpoint) -> Result<WebhookEndpoint, RepositoryError>;
    /// 根据ID查找端点
    async fn find_by_id(&self, id: Uuid) -> Result<Option<WebhookEndpoint>, RepositoryError>;
    /// 查找订阅了事件的活跃端点
    ///
    /// `tenant_id` 为 `None` 时不按租户过滤。
    async fn find_active_endpoints(
        &self,
        event: EventType,
        tenant_id: Option<&str>,
    ) -> Result<Vec<WebhookEndpoint>, RepositoryError>;
    /// 原子地应用一次统计更新
    async fn update_stats(&self, id: Uuid, delta: StatsDelta) -> Result<(), RepositoryError>;
    /// 更新端点状态
    async fn set_status(&self, id: Uuid, status: EndpointStatus) -> Result<(), RepositoryError>;
}
