// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了Webhook分发的核心业务实体，包括：
/// - 投递（delivery）：投递结果、状态机与持久化的重试任务
/// - 端点（endpoint）：订阅事件的外部HTTP回调及其统计
/// - 事件（event）：封闭的事件类型与不可变的事件负载
pub mod delivery;
pub mod endpoint;
pub mod event;
