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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用配置
///
/// 加载顺序：内置默认值 → `config/default` → `config/{APP_ENVIRONMENT}` →
/// `HOOKRS__` 前缀的环境变量（例如 `HOOKRS__DISPATCHER__FAN_OUT_LIMIT=32`）。
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub dispatcher: DispatcherSettings,
    pub retry_worker: RetryWorkerSettings,
    pub metrics: MetricsSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub connect_timeout: Option<u64>,
    pub idle_timeout: Option<u64>,
    /// 是否输出SQL日志
    #[serde(default)]
    pub sqlx_logging: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// 分发器配置
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherSettings {
    /// 同时进行的出站请求上限
    pub fan_out_limit: usize,
    /// 单次尝试的超时（秒）
    pub request_timeout_secs: u64,
    /// 出站请求的 `User-Agent`
    pub user_agent: String,
}

impl DispatcherSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 重试工作器配置
#[derive(Debug, Clone, Deserialize)]
pub struct RetryWorkerSettings {
    pub enabled: bool,
    /// 轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 每次认领的最大任务数
    pub batch_size: u64,
    /// 认领租约（秒），超过后未完成的任务可被重新认领
    pub lease_secs: u64,
}

impl RetryWorkerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Start with default settings
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            // Default DB pool settings
            .set_default("database.url", "sqlite://hookrs.db?mode=rwc")?
            .set_default("database.max_connections", 20)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Default dispatcher settings
            .set_default("dispatcher.fan_out_limit", 16)?
            .set_default("dispatcher.request_timeout_secs", 10)?
            .set_default("dispatcher.user_agent", "CoursePlatform/1.0")?
            // Default retry worker settings
            .set_default("retry_worker.enabled", true)?
            .set_default("retry_worker.poll_interval_ms", 1000)?
            .set_default("retry_worker.batch_size", 50)?
            .set_default("retry_worker.lease_secs", 60)?
            // Default metrics settings
            .set_default("metrics.enabled", true)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("HOOKRS").separator("__"));

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// 校验跨配置段的约束
    ///
    /// 认领租约必须长于单次请求超时，否则仍在发送中的任务会被其他工作器重新认领。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_worker.lease_secs <= self.dispatcher.request_timeout_secs {
            return Err(ConfigError::Message(format!(
                "retry_worker.lease_secs ({}) must be greater than dispatcher.request_timeout_secs ({})",
                self.retry_worker.lease_secs, self.dispatcher.request_timeout_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
