// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::endpoint::WebhookEndpoint;
use crate::domain::models::event::EventType;
use crate::domain::repositories::endpoint_repository::EndpointRepository;
use crate::domain::repositories::RepositoryError;
use std::sync::Arc;
use tracing::debug;

/// 端点匹配器
///
/// 从端点存储中选出某个事件的投递候选。存储返回的结果会再按
/// [`WebhookEndpoint::accepts`] 过滤一次，存储实现的过滤宽松时结果依然正确。
pub struct EndpointMatcher<E: EndpointRepository> {
    endpoints: Arc<E>,
}

impl<E: EndpointRepository> EndpointMatcher<E> {
    pub fn new(endpoints: Arc<E>) -> Self {
        Self { endpoints }
    }

    /// 查找匹配的端点
    ///
    /// # 参数
    ///
    /// * `event` - 事件类型
    /// * `tenant_id` - 租户ID，`None` 时不按租户过滤
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<WebhookEndpoint>)` - 匹配的端点（可能为空）
    /// * `Err(RepositoryError)` - 存储读取失败
    pub async fn match_endpoints(
        &self,
        event: EventType,
        tenant_id: Option<&str>,
    ) -> Result<Vec<WebhookEndpoint>, RepositoryError> {
        let candidates = self
            .endpoints
            .find_active_endpoints(event, tenant_id)
            .await?;

        let matched: Vec<WebhookEndpoint> = candidates
            .into_iter()
            .filter(|endpoint| endpoint.accepts(event, tenant_id))
            .collect();

        debug!(
            event = %event,
            tenant_id = ?tenant_id,
            matched = matched.len(),
            "Matched webhook endpoints"
        );

        Ok(matched)
    }
}
