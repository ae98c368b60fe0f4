// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含事件、端点与投递任务模型，以及签名、匹配、投递和重试服务
pub mod domain;

/// 基础设施模块
///
/// 提供数据库、出站HTTP与指标导出等外部集成
pub mod infrastructure;

/// 表示层模块
///
/// 处理HTTP请求和响应，包括路由和处理器
pub mod presentation;

/// 工具模块
///
/// 提供通用的错误类型与遥测初始化
pub mod utils;

/// 工作器模块
///
/// 实现持久化重试队列的消费和工作器管理
pub mod workers;
