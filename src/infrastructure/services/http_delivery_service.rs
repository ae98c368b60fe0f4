// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::delivery::DeliveryResult;
use crate::domain::models::endpoint::WebhookEndpoint;
use crate::domain::models::event::SerializedPayload;
use crate::domain::services::delivery_service::{request_headers, DeliveryService};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::error::Error as StdError;
use std::time::Duration;

/// 失败响应体最多读取的字节数，足以覆盖错误信息保留的字符数
const MAX_ERROR_BODY_BYTES: usize = 1024;

/// 基于reqwest的投递服务实现
///
/// 所有尝试共享一个连接池。重定向不会被跟随，3xx 按不可重试的失败处理。
pub struct HttpDeliveryService {
    /// HTTP 客户端
    client: reqwest::Client,
    /// 出站请求的 `User-Agent`
    user_agent: String,
    timeout: Duration,
}

impl HttpDeliveryService {
    /// 创建新的投递服务
    ///
    /// # 参数
    ///
    /// * `timeout` - 单次尝试的总超时
    /// * `user_agent` - 出站请求的 `User-Agent`
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            user_agent: user_agent.into(),
            timeout,
        })
    }

    fn header_map(headers: Vec<(String, String)>) -> Result<HeaderMap, String> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| format!("invalid header name: {}", name))?;
            let header_value = HeaderValue::from_str(&value)
                .map_err(|_| format!("invalid value for header {}", name))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }

    fn describe_transport_error(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            return format!("request timed out after {}s", self.timeout.as_secs());
        }

        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

/// 读取失败响应体的前 [`MAX_ERROR_BODY_BYTES`] 个字节
///
/// 其余部分不再读取，连接随响应一起丢弃。读取出错时保留已读到的内容。
async fn read_error_body(mut response: reqwest::Response) -> String {
    let mut buf: Vec<u8> = Vec::with_capacity(MAX_ERROR_BODY_BYTES);
    while buf.len() < MAX_ERROR_BODY_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(MAX_ERROR_BODY_BYTES - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) | Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[async_trait]
impl DeliveryService for HttpDeliveryService {
    async fn attempt(
        &self,
        endpoint: &WebhookEndpoint,
        payload: &SerializedPayload,
    ) -> DeliveryResult {
        let headers = match Self::header_map(request_headers(endpoint, payload, &self.user_agent))
        {
            Ok(headers) => headers,
            Err(e) => return DeliveryResult::invalid_request(e),
        };

        let response = self
            .client
            .post(&endpoint.url)
            .headers(headers)
            .body(payload.body.clone())
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    DeliveryResult::from_status(status, "")
                } else {
                    let body = read_error_body(response).await;
                    DeliveryResult::from_status(status, &body)
                }
            }
            Err(e) if e.is_builder() => {
                DeliveryResult::invalid_request(format!("invalid request: {}", e))
            }
            Err(e) => DeliveryResult::transport(self.describe_transport_error(&e)),
        }
    }
}
