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

use crate::config::settings::RetryWorkerSettings;
use crate::domain::models::delivery::{DeliveryJob, DeliveryStatus};
use crate::domain::repositories::delivery_job_repository::DeliveryJobRepository;
use crate::domain::repositories::endpoint_repository::EndpointRepository;
use crate::domain::services::delivery_pipeline::DeliveryPipeline;
use crate::domain::services::delivery_service::DeliveryService;
use crate::utils::errors::WorkerError;
use crate::workers::worker::Worker;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// 认领租约的上限（一天）
const MAX_LEASE_SECS: u64 = 24 * 60 * 60;

/// 重试工作器
///
/// 定期从持久化队列中认领到期的投递任务并重新投递。
/// 触发时重新读取端点：端点已禁用或已删除时任务被取消，不发送请求，也不更新统计。
/// 重试策略同样在触发时从端点读取。
///
/// 任务的所有写回都以认领时获得的租约为条件；租约过期后被其他工作器
/// 重新认领的任务，原持有者的结果会被丢弃。
pub struct RetryWorker<E, J, D>
where
    E: EndpointRepository + 'static,
    J: DeliveryJobRepository + 'static,
    D: DeliveryService + 'static,
{
    endpoints: Arc<E>,
    jobs: Arc<J>,
    pipeline: Arc<DeliveryPipeline<E, J, D>>,
    poll_interval: Duration,
    batch_size: u64,
    lease: chrono::Duration,
    concurrency: usize,
}

impl<E, J, D> RetryWorker<E, J, D>
where
    E: EndpointRepository + 'static,
    J: DeliveryJobRepository + 'static,
    D: DeliveryService + 'static,
{
    /// 创建重试工作器
    ///
    /// # 参数
    ///
    /// * `endpoints` - 端点存储
    /// * `jobs` - 投递任务存储
    /// * `pipeline` - 与分发器共用的投递流水线
    /// * `settings` - 轮询与认领配置
    /// * `concurrency` - 单批任务的并发处理上限
    pub fn new(
        endpoints: Arc<E>,
        jobs: Arc<J>,
        pipeline: Arc<DeliveryPipeline<E, J, D>>,
        settings: &RetryWorkerSettings,
        concurrency: usize,
    ) -> Self {
        Self {
            endpoints,
            jobs,
            pipeline,
            poll_interval: settings.poll_interval(),
            batch_size: settings.batch_size.max(1),
            lease: chrono::Duration::seconds(settings.lease_secs.clamp(1, MAX_LEASE_SECS) as i64),
            concurrency: concurrency.max(1),
        }
    }

    /// 处理当前到期的任务
    pub async fn process_due_jobs(&self) -> Result<usize, WorkerError> {
        self.process_due_jobs_at(Utc::now()).await
    }

    /// 以指定时间作为“当前时间”处理到期任务
    ///
    /// # 返回值
    ///
    /// 本次认领并处理的任务数
    pub async fn process_due_jobs_at(&self, now: DateTime<Utc>) -> Result<usize, WorkerError> {
        let jobs = self.jobs.claim_due(now, self.batch_size, self.lease).await?;
        let count = jobs.len();
        if count == 0 {
            return Ok(0);
        }

        debug!("Claimed {} due delivery jobs", count);

        stream::iter(jobs)
            .for_each_concurrent(self.concurrency, |job| async move {
                self.fire(job).await;
            })
            .await;

        Ok(count)
    }

    async fn fire(&self, mut job: DeliveryJob) {
        let endpoint = match self.endpoints.find_by_id(job.endpoint_id).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                // Left in_flight; the job is re-claimed once its lease expires.
                error!(
                    job_id = %job.id,
                    endpoint_id = %job.endpoint_id,
                    error = %e,
                    "Failed to load endpoint for webhook retry"
                );
                return;
            }
        };

        match endpoint {
            Some(endpoint) if endpoint.is_active() => {
                if let Some(outcome) = self.pipeline.run_claimed(&endpoint, job, self.lease).await {
                    debug!(
                        endpoint_id = %outcome.endpoint_id,
                        attempt_number = outcome.attempt_number,
                        status = %outcome.status,
                        "Webhook retry processed"
                    );
                }
            }
            endpoint => {
                let reason = if endpoint.is_some() {
                    "endpoint disabled"
                } else {
                    "endpoint not found"
                };
                let Some(lease) = job.locked_until else {
                    return;
                };
                job.status = DeliveryStatus::Cancelled;
                job.next_attempt_at = None;
                job.locked_until = None;
                job.updated_at = Utc::now();

                match self.jobs.update_claimed(&job, lease).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(job_id = %job.id, "Delivery job lease lost before cancelling");
                        return;
                    }
                    Err(e) => {
                        error!(job_id = %job.id, error = %e, "Failed to cancel delivery job");
                        return;
                    }
                }

                counter!("webhook_retry_cancelled_total").increment(1);
                info!(
                    job_id = %job.id,
                    endpoint_id = %job.endpoint_id,
                    reason,
                    "Cancelled webhook retry"
                );
            }
        }
    }
}

#[async_trait]
impl<E, J, D> Worker for RetryWorker<E, J, D>
where
    E: EndpointRepository + 'static,
    J: DeliveryJobRepository + 'static,
    D: DeliveryService + 'static,
{
    async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        info!(
            "Retry worker started (poll interval {}ms, batch size {})",
            self.poll_interval.as_millis(),
            self.batch_size
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            // Shutdown abandons the batch; claimed jobs come back after their lease.
            tokio::select! {
                result = self.process_due_jobs() => match result {
                    Ok(count) if count > 0 => info!("Processed {} webhook retries", count),
                    Ok(_) => {}
                    Err(e) => error!("Failed to process webhook retries: {}", e),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Retry worker stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        "retry_worker"
    }
}
