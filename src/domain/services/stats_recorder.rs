// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::endpoint::StatsDelta;
use crate::domain::repositories::endpoint_repository::EndpointRepository;
use crate::domain::repositories::RepositoryError;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// 端点统计记录器
///
/// 计数通过存储层的原子自增完成，多个并发投递不会丢失更新。
pub struct StatsRecorder<E: EndpointRepository> {
    endpoints: Arc<E>,
}

impl<E: EndpointRepository> StatsRecorder<E> {
    pub fn new(endpoints: Arc<E>) -> Self {
        Self { endpoints }
    }

    /// 记录一次成功投递
    pub async fn record_success(&self, endpoint_id: Uuid) -> Result<(), RepositoryError> {
        self.endpoints
            .update_stats(endpoint_id, StatsDelta::Delivered { at: Utc::now() })
            .await
    }

    /// 记录一次失败投递
    ///
    /// 覆盖 `last_error`；之后的成功不会清除它。
    pub async fn record_failure(
        &self,
        endpoint_id: Uuid,
        error: impl Into<String>,
    ) -> Result<(), RepositoryError> {
        self.endpoints
            .update_stats(
                endpoint_id,
                StatsDelta::Failed {
                    at: Utc::now(),
                    error: error.into(),
                },
            )
            .await
    }
}
