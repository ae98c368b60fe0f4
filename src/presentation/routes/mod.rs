// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::repositories::delivery_job_repository::DeliveryJobRepository;
use crate::domain::repositories::endpoint_repository::EndpointRepository;
use crate::domain::services::delivery_service::DeliveryService;
use crate::domain::use_cases::dispatch_event::DispatchEventUseCase;
use crate::presentation::handlers::{endpoint_handler, event_handler};
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// 创建应用路由
///
/// 处理器依赖通过 `Extension` 注入，见 [`app`]。
pub fn routes<E, J, D>() -> Router
where
    E: EndpointRepository + 'static,
    J: DeliveryJobRepository + 'static,
    D: DeliveryService + 'static,
{
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/v1/version", get(version));

    let api_routes = Router::new()
        .route("/v1/events", post(event_handler::dispatch_event::<E, J, D>))
        .route(
            "/v1/endpoints/{id}/stats",
            get(endpoint_handler::get_endpoint_stats::<E>),
        );

    Router::new().merge(public_routes).merge(api_routes)
}

/// 组装完整的应用
///
/// # 参数
///
/// * `dispatcher` - 事件分发用例
/// * `endpoints` - 端点存储
pub fn app<E, J, D>(dispatcher: Arc<DispatchEventUseCase<E, J, D>>, endpoints: Arc<E>) -> Router
where
    E: EndpointRepository + 'static,
    J: DeliveryJobRepository + 'static,
    D: DeliveryService + 'static,
{
    routes::<E, J, D>()
        .layer(Extension(dispatcher))
        .layer(Extension(endpoints))
        .layer(TraceLayer::new_for_http())
}

/// 健康检查端点
///
/// # 返回值
///
/// 返回"OK"字符串
pub async fn health_check() -> &'static str {
    "OK"
}

/// 版本信息端点
///
/// # 返回值
///
/// 返回应用版本号
pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
