// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 平台事件类型枚举
///
/// 封闭的事件词汇表。新增类型属于编译期变更，而非配置项。
/// 线上名称采用 `资源.动作` 的点分格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "user.created")]
    UserCreated,
    #[serde(rename = "user.updated")]
    UserUpdated,
    #[serde(rename = "course.published")]
    CoursePublished,
    #[serde(rename = "course.updated")]
    CourseUpdated,
    #[serde(rename = "enrollment.created")]
    EnrollmentCreated,
    #[serde(rename = "enrollment.completed")]
    EnrollmentCompleted,
    #[serde(rename = "lesson.completed")]
    LessonCompleted,
    #[serde(rename = "quiz.submitted")]
    QuizSubmitted,
    #[serde(rename = "payment.completed")]
    PaymentCompleted,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "payment.refunded")]
    PaymentRefunded,
    #[serde(rename = "subscription.created")]
    SubscriptionCreated,
    #[serde(rename = "subscription.cancelled")]
    SubscriptionCancelled,
    #[serde(rename = "certificate.issued")]
    CertificateIssued,
    #[serde(rename = "badge.earned")]
    BadgeEarned,
}

impl EventType {
    /// 全部事件类型
    pub const ALL: [EventType; 15] = [
        EventType::UserCreated,
        EventType::UserUpdated,
        EventType::CoursePublished,
        EventType::CourseUpdated,
        EventType::EnrollmentCreated,
        EventType::EnrollmentCompleted,
        EventType::LessonCompleted,
        EventType::QuizSubmitted,
        EventType::PaymentCompleted,
        EventType::PaymentFailed,
        EventType::PaymentRefunded,
        EventType::SubscriptionCreated,
        EventType::SubscriptionCancelled,
        EventType::CertificateIssued,
        EventType::BadgeEarned,
    ];

    /// 返回线上使用的事件名称
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::UserCreated => "user.created",
            EventType::UserUpdated => "user.updated",
            EventType::CoursePublished => "course.published",
            EventType::CourseUpdated => "course.updated",
            EventType::EnrollmentCreated => "enrollment.created",
            EventType::EnrollmentCompleted => "enrollment.completed",
            EventType::LessonCompleted => "lesson.completed",
            EventType::QuizSubmitted => "quiz.submitted",
            EventType::PaymentCompleted => "payment.completed",
            EventType::PaymentFailed => "payment.failed",
            EventType::PaymentRefunded => "payment.refunded",
            EventType::SubscriptionCreated => "subscription.created",
            EventType::SubscriptionCancelled => "subscription.cancelled",
            EventType::CertificateIssued => "certificate.issued",
            EventType::BadgeEarned => "badge.earned",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知事件类型
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

/// 事件负载
///
/// 每次分发为每个匹配端点创建一次，之后不可变。
/// 重试会原样重发同一份序列化结果，接收方可按 `id` 去重。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// 负载唯一标识符，在同一逻辑投递的所有重试间保持不变
    pub id: Uuid,
    /// 事件类型
    pub event: EventType,
    /// 首次分发时间
    pub timestamp: DateTime<Utc>,
    /// 事件数据
    pub data: serde_json::Value,
    /// 可选的上下文信息
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub metadata: Option<serde_json::Value>,
}

impl EventPayload {
    pub fn new(
        event: EventType,
        data: serde_json::Value,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            timestamp: Utc::now(),
            data: canonicalize(data),
            metadata: metadata.map(canonicalize),
        }
    }

    /// 序列化为规范 JSON
    pub fn serialize(&self) -> Result<SerializedPayload, serde_json::Error> {
        Ok(SerializedPayload {
            id: self.id,
            event: self.event,
            body: serde_json::to_string(self)?,
        })
    }
}

/// 递归地按键排序 JSON 对象
///
/// 即使 `serde_json` 开启了 `preserve_order`，输出的键顺序也保持确定。
pub fn canonicalize(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, canonicalize(value)))
                    .collect(),
            )
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(canonicalize).collect())
        }
        other => other,
    }
}

/// 已序列化的事件负载
///
/// 每次尝试（首次及重试）发送的请求体字节完全一致。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedPayload {
    pub id: Uuid,
    pub event: EventType,
    pub body: String,
}
