// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::MetricsSettings;
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 初始化指标导出
///
/// 配置禁用或监听地址非法时只记录警告，不影响服务启动。
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        info!("Metrics exporter disabled");
        return;
    }

    let addr: SocketAddr = match settings.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(
                "Invalid metrics listen address {}: {}. Metrics exporter not started.",
                settings.listen_addr, e
            );
            return;
        }
    };

    // Ignore error if address is already in use (for development/testing)
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
        return;
    }

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
}

fn describe_metrics() {
    describe_counter!(
        "webhook_delivery_attempts_total",
        "Total number of outbound webhook delivery attempts"
    );
    describe_counter!(
        "webhook_delivery_success_total",
        "Total number of webhook deliveries answered with 2xx"
    );
    describe_counter!(
        "webhook_delivery_failed_total",
        "Total number of failed webhook delivery attempts, labelled by reason"
    );
    describe_counter!(
        "webhook_retry_scheduled_total",
        "Total number of webhook retries written to the delivery queue"
    );
    describe_counter!(
        "webhook_dead_letter_total",
        "Total number of webhook deliveries that exhausted their retries"
    );
    describe_counter!(
        "webhook_retry_cancelled_total",
        "Total number of retries skipped because the endpoint was disabled or removed"
    );
    describe_histogram!(
        "webhook_delivery_duration_seconds",
        Unit::Seconds,
        "Duration of a single webhook delivery attempt"
    );
}
