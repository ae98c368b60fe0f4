// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::event::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Webhook端点实体
///
/// 表示一个已注册的外部HTTP回调地址。端点记录由外部存储协作者持有，
/// 本模块只读取它，并通过统计记录器更新其 `stats` 字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    /// 端点唯一标识符
    pub id: Uuid,
    /// 所属租户，`None` 表示全局端点
    pub tenant_id: Option<String>,
    /// 回调URL
    pub url: String,
    /// 共享签名密钥，缺失时以不签名方式投递
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    /// 订阅的事件类型
    pub subscribed_events: Vec<EventType>,
    /// 自定义请求头，按插入顺序合并到每个请求中
    pub custom_headers: Vec<(String, String)>,
    /// 重试策略
    pub retry_policy: RetryPolicy,
    /// 端点状态
    pub status: EndpointStatus,
    /// 投递统计
    pub stats: EndpointStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookEndpoint {
    /// 创建一个新的活跃端点
    pub fn new(tenant_id: Option<String>, url: String, subscribed_events: Vec<EventType>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            url,
            secret: None,
            subscribed_events,
            custom_headers: Vec::new(),
            retry_policy: RetryPolicy::default(),
            status: EndpointStatus::Active,
            stats: EndpointStats::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_headers.push((name.into(), value.into()));
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == EndpointStatus::Active
    }

    /// 判断端点是否是某个事件的分发候选
    ///
    /// 条件：状态为 active、订阅了该事件，且未指定租户或租户一致。
    pub fn accepts(&self, event: EventType, tenant_id: Option<&str>) -> bool {
        self.is_active()
            && self.subscribed_events.contains(&event)
            && tenant_id.is_none_or(|tenant| self.tenant_id.as_deref() == Some(tenant))
    }
}

/// 端点状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    #[default]
    Active,
    Disabled,
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointStatus::Active => write!(f, "active"),
            EndpointStatus::Disabled => write!(f, "disabled"),
        }
    }
}

impl FromStr for EndpointStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EndpointStatus::Active),
            "disabled" => Ok(EndpointStatus::Disabled),
            other => Err(format!("unknown endpoint status: {}", other)),
        }
    }
}

/// 端点重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// 首次尝试之后允许的最大重试次数
    pub max_retries: u32,
    /// 退避基数（秒），第 n 次（从0开始）重试前等待 `base * 2^n`
    pub retry_delay_seconds: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_seconds: 60,
        }
    }
}

/// 端点投递统计
///
/// 计数只增不减；`last_error` 是最近一次失败的历史记录，成功不会清除它。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EndpointStats {
    pub delivered_count: u64,
    pub failed_count: u64,
    pub last_delivered_at: Option<DateTime<Utc>>,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// 单次统计更新
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsDelta {
    /// 一次成功投递
    Delivered { at: DateTime<Utc> },
    /// 一次失败投递
    Failed { at: DateTime<Utc>, error: String },
}
