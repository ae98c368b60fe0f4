// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::DbErr;
use thiserror::Error;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 记录无法映射为领域对象
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    /// 认领租约已被其他工作器接管
    #[error("Delivery job lease lost")]
    LeaseLost,
}
