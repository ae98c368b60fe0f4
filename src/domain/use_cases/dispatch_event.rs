// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::delivery::{DeliveryJob, DeliveryOutcome};
use crate::domain::models::event::{EventPayload, EventType};
use crate::domain::repositories::delivery_job_repository::DeliveryJobRepository;
use crate::domain::repositories::endpoint_repository::EndpointRepository;
use crate::domain::repositories::RepositoryError;
use crate::domain::services::delivery_pipeline::DeliveryPipeline;
use crate::domain::services::delivery_service::DeliveryService;
use crate::domain::services::endpoint_matcher::EndpointMatcher;
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// 事件分发错误
///
/// 只有无法读取端点列表或无法构造负载时才会出现；
/// 单个端点的投递失败体现在返回的 [`DeliveryOutcome`] 中。
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to load webhook endpoints: {0}")]
    Store(#[from] RepositoryError),
    #[error("Failed to serialize event payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 事件分发用例
pub struct DispatchEventUseCase<E, J, D>
where
    E: EndpointRepository + 'static,
    J: DeliveryJobRepository + 'static,
    D: DeliveryService + 'static,
{
    matcher: EndpointMatcher<E>,
    pipeline: Arc<DeliveryPipeline<E, J, D>>,
}

impl<E, J, D> DispatchEventUseCase<E, J, D>
where
    E: EndpointRepository + 'static,
    J: DeliveryJobRepository + 'static,
    D: DeliveryService + 'static,
{
    pub fn new(endpoints: Arc<E>, pipeline: Arc<DeliveryPipeline<E, J, D>>) -> Self {
        Self {
            matcher: EndpointMatcher::new(endpoints),
            pipeline,
        }
    }

    /// 分发一个事件
    ///
    /// 为每个匹配端点构造一份新负载，并在各自独立的任务中执行首次尝试。
    ///
    /// # 参数
    ///
    /// * `event` - 事件类型
    /// * `data` - 事件数据
    /// * `tenant_id` - 租户ID，`None` 时投递给所有订阅端点
    /// * `metadata` - 可选的上下文信息
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<DeliveryOutcome>)` - 每个端点首次尝试的结果，顺序不保证
    /// * `Err(DispatchError)` - 端点列表读取失败
    pub async fn execute(
        &self,
        event: EventType,
        data: serde_json::Value,
        tenant_id: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Vec<DeliveryOutcome>, DispatchError> {
        let endpoints = self.matcher.match_endpoints(event, tenant_id).await?;
        if endpoints.is_empty() {
            info!(event = %event, tenant_id = ?tenant_id, "No webhook endpoints subscribed");
            return Ok(Vec::new());
        }

        let mut handles = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let payload = EventPayload::new(event, data.clone(), metadata.clone()).serialize()?;
            let job = DeliveryJob::new(endpoint.id, payload);
            let pipeline = self.pipeline.clone();
            handles.push(tokio::spawn(async move {
                pipeline.run(&endpoint, job).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for joined in join_all(handles).await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(event = %event, error = %e, "Webhook delivery task failed"),
            }
        }

        info!(
            event = %event,
            tenant_id = ?tenant_id,
            endpoints = outcomes.len(),
            delivered = outcomes.iter().filter(|o| o.result.success).count(),
            "Dispatched webhook event"
        );

        Ok(outcomes)
    }
}
