// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::endpoint::{EndpointStats, EndpointStatus};
use crate::domain::repositories::endpoint_repository::EndpointRepository;
use crate::domain::repositories::RepositoryError;
use crate::presentation::errors::AppError;
use axum::{extract::Path, Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// 端点投递统计响应
#[derive(Debug, Serialize, Deserialize)]
pub struct EndpointStatsResponse {
    pub endpoint_id: Uuid,
    pub status: EndpointStatus,
    pub stats: EndpointStats,
}

/// 查询端点的投递统计
pub async fn get_endpoint_stats<E: EndpointRepository + 'static>(
    Extension(repo): Extension<Arc<E>>,
    Path(id): Path<Uuid>,
) -> Result<Json<EndpointStatsResponse>, AppError> {
    let endpoint = repo.find_by_id(id).await?.ok_or(RepositoryError::NotFound)?;

    Ok(Json(EndpointStatsResponse {
        endpoint_id: endpoint.id,
        status: endpoint.status,
        stats: endpoint.stats,
    }))
}
