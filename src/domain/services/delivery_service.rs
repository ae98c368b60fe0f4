// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::delivery::DeliveryResult;
use crate::domain::models::endpoint::WebhookEndpoint;
use crate::domain::models::event::SerializedPayload;
use crate::domain::services::signer;
use async_trait::async_trait;
use chrono::Utc;

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_USER_AGENT: &str = "User-Agent";
pub const HEADER_WEBHOOK_ID: &str = "X-Webhook-Id";
pub const HEADER_WEBHOOK_EVENT: &str = "X-Webhook-Event";
pub const HEADER_WEBHOOK_SIGNATURE: &str = "X-Webhook-Signature";

/// 投递服务trait
///
/// 执行一次HTTP尝试并把结果分类。实现不得返回错误：
/// 所有失败都体现在 [`DeliveryResult`] 中。
#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// 向端点发送一次序列化负载
    async fn attempt(
        &self,
        endpoint: &WebhookEndpoint,
        payload: &SerializedPayload,
    ) -> DeliveryResult;
}

/// 构造一次尝试的请求头
///
/// 每次尝试都重新签名，时间戳取发送时刻。
pub fn request_headers(
    endpoint: &WebhookEndpoint,
    payload: &SerializedPayload,
    user_agent: &str,
) -> Vec<(String, String)> {
    request_headers_at(endpoint, payload, user_agent, Utc::now().timestamp())
}

/// 以指定签名时间戳构造请求头
///
/// 标准头先写入，端点的自定义头最后按顺序合并。名称比较不区分大小写，
/// 同名时自定义头覆盖标准头（包括签名头）。
pub fn request_headers_at(
    endpoint: &WebhookEndpoint,
    payload: &SerializedPayload,
    user_agent: &str,
    timestamp: i64,
) -> Vec<(String, String)> {
    let mut headers = vec![
        (HEADER_CONTENT_TYPE.to_string(), "application/json".to_string()),
        (HEADER_USER_AGENT.to_string(), user_agent.to_string()),
        (HEADER_WEBHOOK_ID.to_string(), payload.id.to_string()),
        (HEADER_WEBHOOK_EVENT.to_string(), payload.event.to_string()),
    ];

    if let Some(secret) = endpoint.secret.as_deref().filter(|s| !s.is_empty()) {
        headers.push((
            HEADER_WEBHOOK_SIGNATURE.to_string(),
            signer::sign_at(&payload.body, secret.as_bytes(), timestamp),
        ));
    }

    for (name, value) in &endpoint.custom_headers {
        match headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => *slot = (name.clone(), value.clone()),
            None => headers.push((name.clone(), value.clone())),
        }
    }

    headers
}
