// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::event::SerializedPayload;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 响应体在错误信息中保留的最大字符数
const MAX_ERROR_BODY_CHARS: usize = 256;

/// 单次投递尝试的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retryable: bool,
}

impl DeliveryResult {
    /// 根据HTTP响应状态码分类
    ///
    /// * 2xx：成功
    /// * 4xx：客户端拒绝，不可重试
    /// * 5xx：服务端错误，可重试
    /// * 其他（重定向后的 1xx/3xx）：不可重试
    pub fn from_status(status: u16, body: &str) -> Self {
        if (200..300).contains(&status) {
            return Self {
                success: true,
                status_code: Some(status),
                error: None,
                retryable: false,
            };
        }

        let body: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
        let error = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body)
        };

        Self {
            success: false,
            status_code: Some(status),
            error: Some(error),
            retryable: (500..600).contains(&status),
        }
    }

    /// 传输层失败（DNS、TCP、TLS、超时），可重试
    pub fn transport(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: None,
            error: Some(error.into()),
            retryable: true,
        }
    }

    /// 请求无法构造（例如非法的自定义请求头），不可重试
    pub fn invalid_request(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code: None,
            error: Some(error.into()),
            retryable: false,
        }
    }

    /// 失败原因，供统计记录使用
    pub fn error_text(&self) -> String {
        self.error.clone().unwrap_or_else(|| match self.status_code {
            Some(status) => format!("HTTP {}", status),
            None => "unknown delivery error".to_string(),
        })
    }
}

/// 逻辑投递的状态机
///
/// `pending -> {delivered | failed | retry_scheduled}`，
/// `retry_scheduled -> in_flight -> ...`（退避到期后被工作器认领）。
/// 终态为 `delivered`、`failed` 与 `cancelled`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// 尚未尝试
    #[default]
    Pending,
    /// 已被重试工作器认领，正在尝试
    InFlight,
    /// 等待退避到期
    RetryScheduled,
    /// 已成功投递
    Delivered,
    /// 永久失败（不可重试或重试耗尽）
    Failed,
    /// 触发时端点已禁用或已删除，重试被跳过
    Cancelled,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Failed | DeliveryStatus::Cancelled
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::InFlight => "in_flight",
            DeliveryStatus::RetryScheduled => "retry_scheduled",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "in_flight" => Ok(DeliveryStatus::InFlight),
            "retry_scheduled" => Ok(DeliveryStatus::RetryScheduled),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            "cancelled" => Ok(DeliveryStatus::Cancelled),
            other => Err(format!("unknown delivery status: {}", other)),
        }
    }
}

/// 投递任务
///
/// 一个负载到一个端点的逻辑投递。首次尝试在内存中完成；
/// 一旦需要重试，任务会被持久化，重试在进程重启后依然有效。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryJob {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 目标端点ID
    pub endpoint_id: Uuid,
    /// 不可变的序列化负载
    pub payload: SerializedPayload,
    /// 下一次尝试的序号（从0开始，0为首次尝试）
    pub attempt_number: u32,
    /// 当前状态
    pub status: DeliveryStatus,
    /// 下一次尝试时间
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// 认领租约到期时间
    pub locked_until: Option<DateTime<Utc>>,
    /// 最近一次尝试时间
    pub last_attempted_at: Option<DateTime<Utc>>,
    /// 最近一次响应状态码
    pub last_status_code: Option<u16>,
    /// 最近一次错误信息
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryJob {
    pub fn new(endpoint_id: Uuid, payload: SerializedPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            endpoint_id,
            payload,
            attempt_number: 0,
            status: DeliveryStatus::Pending,
            next_attempt_at: None,
            locked_until: None,
            last_attempted_at: None,
            last_status_code: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 首次尝试之后任务才会落库
    pub fn is_persisted(&self) -> bool {
        self.attempt_number > 0
    }

    /// 记录一次尝试的结果
    pub fn record_attempt(&mut self, result: &DeliveryResult, at: DateTime<Utc>) {
        self.last_attempted_at = Some(at);
        self.last_status_code = result.status_code;
        if !result.success {
            self.last_error = result.error.clone();
        }
        self.locked_until = None;
        self.updated_at = at;
    }
}

/// 计算认领租约的到期时间
///
/// 截断到微秒，保证写入数据库后读回的值与内存中的值逐位相等，
/// 租约才能作为条件更新的比较键。
pub fn lease_deadline(now: DateTime<Utc>, lease: chrono::Duration) -> DateTime<Utc> {
    (now + lease).trunc_subsecs(6)
}

/// 单个端点的分发结果
///
/// 反映首次尝试的结果；后续重试的最终结果通过端点统计观察。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub endpoint_id: Uuid,
    pub payload_id: Uuid,
    pub attempt_number: u32,
    pub status: DeliveryStatus,
    pub result: DeliveryResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}
