// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! Webhook payload signing.
//!
//! Header format: `t=<unix-seconds>,v1=<hex hmac-sha256>` where the MAC
//! covers `"{t}.{body}"`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// 默认的签名容忍时间（秒）
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// 签名头解析错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing timestamp component")]
    MissingTimestamp,
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("missing v1 signature component")]
    MissingSignature,
}

/// 解析后的签名头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    /// 解析 `t=...,v1=...` 形式的签名头
    ///
    /// 允许出现多个 `v1`（密钥轮换），忽略未知的组件。
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    let parsed = value
                        .parse::<i64>()
                        .map_err(|_| SignatureError::InvalidTimestamp(value.to_string()))?;
                    timestamp = Some(parsed);
                }
                "v1" if !value.is_empty() => signatures.push(value.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
        if signatures.is_empty() {
            return Err(SignatureError::MissingSignature);
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// 计算 HMAC-SHA256 并以十六进制返回
pub fn compute_signature(secret: &[u8], timestamp: i64, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// 使用当前时间为负载签名
pub fn sign(body: &str, secret: &[u8]) -> String {
    sign_at(body, secret, Utc::now().timestamp())
}

/// 使用指定时间戳为负载签名
pub fn sign_at(body: &str, secret: &[u8], timestamp: i64) -> String {
    let signature = compute_signature(secret, timestamp, body.as_bytes());
    format!("t={},v1={}", timestamp, signature)
}

/// 使用当前时间校验签名
///
/// 头部格式错误、时间戳超出容忍范围或签名不匹配时均返回 `false`。
pub fn verify(raw_body: &[u8], header: &str, secret: &[u8], tolerance_secs: u64) -> bool {
    verify_at(raw_body, header, secret, tolerance_secs, Utc::now().timestamp())
}

/// 以指定的“当前时间”校验签名
pub fn verify_at(
    raw_body: &[u8],
    header: &str,
    secret: &[u8],
    tolerance_secs: u64,
    now: i64,
) -> bool {
    let parsed = match SignatureHeader::parse(header) {
        Ok(parsed) => parsed,
        Err(_) => return false,
    };

    if now.abs_diff(parsed.timestamp) > tolerance_secs {
        return false;
    }

    let expected = compute_signature(secret, parsed.timestamp, raw_body);
    // Compare every candidate so the work done does not depend on which one matches.
    parsed
        .signatures
        .iter()
        .fold(false, |matched, candidate| {
            let equal: bool = expected.as_bytes().ct_eq(candidate.as_bytes()).into();
            matched | equal
        })
}
