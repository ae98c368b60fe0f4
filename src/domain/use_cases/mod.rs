// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域用例模块
///
/// 当前的用例：
/// - 分发事件（dispatch_event）：把一个平台事件扇出到所有匹配的端点
pub mod dispatch_event;
