// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::delivery::{DeliveryJob, DeliveryStatus};
use crate::domain::models::endpoint::RetryPolicy;
use crate::domain::repositories::delivery_job_repository::DeliveryJobRepository;
use crate::domain::repositories::RepositoryError;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 单次退避的上限（30天），保证到期时间始终可表示
pub const MAX_BACKOFF_SECS: u64 = 30 * 24 * 60 * 60;

/// 计算第 `attempt_number` 次（从0开始）重试前的退避时间
///
/// `delay = base * 2^attempt_number`，溢出时饱和到 [`MAX_BACKOFF_SECS`]。
pub fn backoff_delay(base_delay_seconds: u32, attempt_number: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt_number).unwrap_or(u64::MAX);
    let secs = u64::from(base_delay_seconds)
        .saturating_mul(factor)
        .min(MAX_BACKOFF_SECS);
    Duration::from_secs(secs)
}

/// 重试决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// 已安排下一次尝试
    Scheduled {
        /// 下一次尝试的序号
        attempt_number: u32,
        delay: Duration,
        due_at: DateTime<Utc>,
    },
    /// 重试次数耗尽
    Exhausted { max_retries: u32 },
}

/// 纯函数形式的重试决策
///
/// `attempt_number` 为刚刚失败的那次尝试的序号。
pub fn decide(attempt_number: u32, policy: &RetryPolicy, now: DateTime<Utc>) -> RetryDecision {
    if attempt_number >= policy.max_retries {
        return RetryDecision::Exhausted {
            max_retries: policy.max_retries,
        };
    }

    let delay = backoff_delay(policy.retry_delay_seconds, attempt_number);
    // MAX_BACKOFF_SECS fits in i64 seconds.
    let due_at = now + chrono::Duration::seconds(delay.as_secs() as i64);

    RetryDecision::Scheduled {
        attempt_number: attempt_number + 1,
        delay,
        due_at,
    }
}

/// 重试调度器
///
/// 把可重试的失败写入持久化任务队列，到期后由重试工作器认领。
/// 首次尝试的任务只存在于内存中，第一次安排重试时才落库。
pub struct RetryScheduler<J: DeliveryJobRepository> {
    jobs: Arc<J>,
}

impl<J: DeliveryJobRepository> RetryScheduler<J> {
    pub fn new(jobs: Arc<J>) -> Self {
        Self { jobs }
    }

    /// 为一次可重试的失败安排重试
    ///
    /// # 参数
    ///
    /// * `job` - 刚刚失败的任务，`attempt_number` 为失败那次尝试的序号
    /// * `policy` - 端点的重试策略
    /// * `now` - 失败发生的时间
    /// * `lease` - 重试工作器认领任务时获得的租约；首次尝试为 `None`
    ///
    /// # 返回值
    ///
    /// 决策结果。`Scheduled` 时任务已被写入队列；`Exhausted` 时任务被标记为
    /// `failed`（若已落库则同步更新）。租约已被接管时返回
    /// [`RepositoryError::LeaseLost`]，任务保持由新持有者处理。
    pub async fn schedule_retry(
        &self,
        job: &mut DeliveryJob,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
        lease: Option<DateTime<Utc>>,
    ) -> Result<RetryDecision, RepositoryError> {
        let decision = decide(job.attempt_number, policy, now);
        let persisted = job.is_persisted();

        match &decision {
            RetryDecision::Scheduled {
                attempt_number,
                delay,
                due_at,
            } => {
                job.attempt_number = *attempt_number;
                job.status = DeliveryStatus::RetryScheduled;
                job.next_attempt_at = Some(*due_at);
                job.locked_until = None;
                job.updated_at = now;

                if persisted {
                    self.write_back(job, lease).await?;
                } else {
                    *job = self.jobs.create(job).await?;
                }

                counter!("webhook_retry_scheduled_total").increment(1);
                info!(
                    job_id = %job.id,
                    endpoint_id = %job.endpoint_id,
                    attempt_number = job.attempt_number,
                    delay_secs = delay.as_secs(),
                    "Scheduled webhook retry"
                );
            }
            RetryDecision::Exhausted { max_retries } => {
                job.status = DeliveryStatus::Failed;
                job.next_attempt_at = None;
                job.locked_until = None;
                job.updated_at = now;

                if persisted {
                    self.write_back(job, lease).await?;
                }

                counter!("webhook_dead_letter_total").increment(1);
                warn!(
                    job_id = %job.id,
                    endpoint_id = %job.endpoint_id,
                    max_retries = *max_retries,
                    "Webhook delivery exhausted its retries"
                );
            }
        }

        Ok(decision)
    }

    /// 把已落库任务的新状态写回队列
    ///
    /// 持有租约时以租约为条件更新，租约已被接管则返回 [`RepositoryError::LeaseLost`]。
    pub async fn write_back(
        &self,
        job: &DeliveryJob,
        lease: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        match lease {
            Some(lease) => {
                if !self.jobs.update_claimed(job, lease).await? {
                    return Err(RepositoryError::LeaseLost);
                }
            }
            None => {
                self.jobs.update(job).await?;
            }
        }
        Ok(())
    }
}
