// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施服务模块
///
/// 提供领域服务trait的具体实现，目前是基于HTTP的Webhook投递
pub mod http_delivery_service;
