// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，遵循依赖倒置原则。
/// 具体实现由基础设施层提供。
///
/// 包含的仓库接口：
/// - 投递任务仓库（delivery_job_repository）：持久化的重试队列
/// - 端点仓库（endpoint_repository）：端点查询与原子统计更新
pub mod delivery_job_repository;
pub mod endpoint_repository;
pub mod repository_error;

pub use repository_error::RepositoryError;
