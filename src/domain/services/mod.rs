// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 签名（signer）：负载签名与签名校验
/// - 端点匹配（endpoint_matcher）：选出事件的投递候选
/// - 投递服务（delivery_service）：单次HTTP尝试的抽象与请求头构造
/// - 重试调度（retry_scheduler）：指数退避与持久化重试
/// - 统计记录（stats_recorder）：端点投递计数
/// - 投递流水线（delivery_pipeline）：把以上服务串成一次完整的处理
pub mod delivery_pipeline;
pub mod delivery_service;
pub mod endpoint_matcher;
pub mod retry_scheduler;
pub mod signer;
pub mod stats_recorder;
