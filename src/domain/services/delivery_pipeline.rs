// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::delivery::{
    lease_deadline, DeliveryJob, DeliveryOutcome, DeliveryResult, DeliveryStatus,
};
use crate::domain::models::endpoint::WebhookEndpoint;
use crate::domain::repositories::delivery_job_repository::DeliveryJobRepository;
use crate::domain::repositories::endpoint_repository::EndpointRepository;
use crate::domain::repositories::RepositoryError;
use crate::domain::services::delivery_service::DeliveryService;
use crate::domain::services::retry_scheduler::{RetryDecision, RetryScheduler};
use crate::domain::services::stats_recorder::StatsRecorder;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 投递流水线
///
/// 分发器（首次尝试）与重试工作器（后续尝试）共用的处理流程：
/// 尝试 → 任务写回 → 统计。所有出站请求共享同一个并发上限。
/// 重试工作器持有的任务以认领租约为条件写回，租约被接管时结果作废，不计入统计。
///
/// 流水线从不返回错误。统计或任务落库失败只记录日志，
/// 投递失败本身是数据而不是异常。
pub struct DeliveryPipeline<E, J, D>
where
    E: EndpointRepository,
    J: DeliveryJobRepository,
    D: DeliveryService,
{
    delivery: Arc<D>,
    jobs: Arc<J>,
    stats: StatsRecorder<E>,
    scheduler: RetryScheduler<J>,
    permits: Arc<Semaphore>,
}

impl<E, J, D> DeliveryPipeline<E, J, D>
where
    E: EndpointRepository,
    J: DeliveryJobRepository,
    D: DeliveryService,
{
    /// 创建投递流水线
    ///
    /// # 参数
    ///
    /// * `endpoints` - 端点存储，用于统计更新
    /// * `jobs` - 投递任务存储
    /// * `delivery` - 出站投递服务
    /// * `fan_out_limit` - 同时进行的出站请求上限
    pub fn new(endpoints: Arc<E>, jobs: Arc<J>, delivery: Arc<D>, fan_out_limit: usize) -> Self {
        Self {
            delivery,
            stats: StatsRecorder::new(endpoints),
            scheduler: RetryScheduler::new(jobs.clone()),
            jobs,
            permits: Arc::new(Semaphore::new(fan_out_limit.max(1))),
        }
    }

    /// 对一个端点执行一次尝试并推进任务状态
    ///
    /// 返回本次尝试的结果。可重试的失败会被写入持久化队列，
    /// 由重试工作器在退避到期后继续。
    pub async fn run(&self, endpoint: &WebhookEndpoint, job: DeliveryJob) -> DeliveryOutcome {
        // Semaphore is never closed; a missing permit only means no bound.
        let permit = self.permits.acquire().await.ok();
        self.deliver(endpoint, job, permit, None).await
    }

    /// 执行一个由重试工作器认领的任务
    ///
    /// 取得并发许可后先续租，租约从发送前开始计算；之后的写回都以续租得到的
    /// 租约为条件。租约已被其他工作器接管时不发送请求，返回 `None`。
    pub async fn run_claimed(
        &self,
        endpoint: &WebhookEndpoint,
        mut job: DeliveryJob,
        lease: chrono::Duration,
    ) -> Option<DeliveryOutcome> {
        let permit = self.permits.acquire().await.ok();

        let current = job.locked_until?;
        let renewed = lease_deadline(Utc::now(), lease);
        match self.jobs.renew_lease(job.id, current, renewed).await {
            Ok(true) => job.locked_until = Some(renewed),
            Ok(false) => {
                info!(job_id = %job.id, "Delivery job lease lost before sending, skipping");
                return None;
            }
            Err(e) => {
                // Left in_flight; the job is re-claimed once its lease expires.
                error!(job_id = %job.id, error = %e, "Failed to renew delivery job lease");
                return None;
            }
        }

        Some(self.deliver(endpoint, job, permit, Some(renewed)).await)
    }

    async fn deliver(
        &self,
        endpoint: &WebhookEndpoint,
        mut job: DeliveryJob,
        permit: Option<SemaphorePermit<'_>>,
        lease: Option<DateTime<Utc>>,
    ) -> DeliveryOutcome {
        let attempt_number = job.attempt_number;
        let result = self.attempt(endpoint, &job).await;
        drop(permit);

        let now = Utc::now();
        job.record_attempt(&result, now);

        let mut next_attempt_at = None;

        if result.success {
            job.status = DeliveryStatus::Delivered;
            if self.save_terminal(&job, lease).await {
                self.record_success(endpoint.id).await;
                info!(
                    endpoint_id = %endpoint.id,
                    payload_id = %job.payload.id,
                    attempt_number,
                    "Webhook delivered"
                );
            } else {
                job.status = DeliveryStatus::InFlight;
            }
        } else if !result.retryable {
            let error_text = result.error_text();
            job.status = DeliveryStatus::Failed;
            if self.save_terminal(&job, lease).await {
                self.record_failure(endpoint.id, &error_text).await;
                warn!(
                    endpoint_id = %endpoint.id,
                    payload_id = %job.payload.id,
                    attempt_number,
                    error = %error_text,
                    "Webhook rejected, not retrying"
                );
            } else {
                job.status = DeliveryStatus::InFlight;
            }
        } else {
            let error_text = result.error_text();
            match self
                .scheduler
                .schedule_retry(&mut job, &endpoint.retry_policy, now, lease)
                .await
            {
                Ok(RetryDecision::Scheduled { due_at, .. }) => {
                    self.record_failure(endpoint.id, &error_text).await;
                    next_attempt_at = Some(due_at);
                }
                Ok(RetryDecision::Exhausted { max_retries }) => {
                    let exhausted = format!("max retries ({}) exceeded: {}", max_retries, error_text);
                    self.record_failure(endpoint.id, &exhausted).await;
                }
                Err(RepositoryError::LeaseLost) => {
                    warn!(
                        job_id = %job.id,
                        attempt_number,
                        error = %error_text,
                        "Delivery job lease lost, discarding attempt result"
                    );
                    job.status = DeliveryStatus::InFlight;
                }
                Err(e) => {
                    error!(
                        endpoint_id = %endpoint.id,
                        payload_id = %job.payload.id,
                        error = %e,
                        "Failed to persist webhook retry, giving up on delivery"
                    );
                    self.record_failure(endpoint.id, &error_text).await;
                    job.status = DeliveryStatus::Failed;
                }
            }
        }

        DeliveryOutcome {
            endpoint_id: endpoint.id,
            payload_id: job.payload.id,
            attempt_number,
            status: job.status,
            result,
            next_attempt_at,
        }
    }

    async fn attempt(&self, endpoint: &WebhookEndpoint, job: &DeliveryJob) -> DeliveryResult {
        debug!(
            endpoint_id = %endpoint.id,
            url = %endpoint.url,
            attempt_number = job.attempt_number,
            "Attempting webhook delivery"
        );

        counter!("webhook_delivery_attempts_total").increment(1);
        let start = Instant::now();
        let result = self.delivery.attempt(endpoint, &job.payload).await;
        histogram!("webhook_delivery_duration_seconds").record(start.elapsed().as_secs_f64());

        if result.success {
            counter!("webhook_delivery_success_total").increment(1);
        } else {
            counter!("webhook_delivery_failed_total", "reason" => failure_reason(&result))
                .increment(1);
        }

        result
    }

    async fn record_success(&self, endpoint_id: Uuid) {
        if let Err(e) = self.stats.record_success(endpoint_id).await {
            error!(endpoint_id = %endpoint_id, error = %e, "Failed to record delivery success");
        }
    }

    async fn record_failure(&self, endpoint_id: Uuid, error_text: &str) {
        if let Err(e) = self.stats.record_failure(endpoint_id, error_text).await {
            error!(endpoint_id = %endpoint_id, error = %e, "Failed to record delivery failure");
        }
    }

    /// 同步终态；只有已落库（经历过重试）的任务需要写回
    ///
    /// 返回 `false` 表示租约已被接管，本次结果作废。
    async fn save_terminal(&self, job: &DeliveryJob, lease: Option<DateTime<Utc>>) -> bool {
        if !job.is_persisted() {
            return true;
        }
        match self.scheduler.write_back(job, lease).await {
            Ok(()) => true,
            Err(RepositoryError::LeaseLost) => {
                warn!(
                    job_id = %job.id,
                    status = %job.status,
                    "Delivery job lease lost, discarding attempt result"
                );
                false
            }
            Err(e) => {
                error!(
                    job_id = %job.id,
                    status = %job.status,
                    error = %e,
                    "Failed to update delivery job"
                );
                true
            }
        }
    }
}

fn failure_reason(result: &DeliveryResult) -> &'static str {
    match result.status_code {
        Some(400..=499) => "client_error",
        Some(500..=599) => "server_error",
        Some(_) => "unexpected_status",
        None if result.retryable => "transport",
        None => "invalid_request",
    }
}
