// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::delivery::DeliveryOutcome;
use crate::domain::models::event::EventType;
use crate::domain::repositories::delivery_job_repository::DeliveryJobRepository;
use crate::domain::repositories::endpoint_repository::EndpointRepository;
use crate::domain::services::delivery_service::DeliveryService;
use crate::domain::use_cases::dispatch_event::DispatchEventUseCase;
use crate::presentation::errors::AppError;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use validator::{Validate, ValidationError};

/// 事件分发请求
#[derive(Debug, Deserialize, Validate)]
pub struct DispatchEventRequest {
    /// 事件线上名称，如 `course.published`
    #[validate(length(min = 1, max = 64))]
    pub event: String,
    #[validate(custom(function = "validate_object"))]
    pub data: serde_json::Value,
    #[validate(length(min = 1, max = 128))]
    pub tenant_id: Option<String>,
    #[validate(custom(function = "validate_object"))]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchEventResponse {
    pub deliveries: Vec<DeliveryOutcome>,
}

fn validate_object(value: &serde_json::Value) -> Result<(), ValidationError> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ValidationError::new("not_an_object")
            .with_message(Cow::Borrowed("must be a JSON object")))
    }
}

/// 分发事件
///
/// 返回每个匹配端点首次尝试的结果。单个端点的投递失败不会导致请求失败。
pub async fn dispatch_event<E, J, D>(
    Extension(use_case): Extension<Arc<DispatchEventUseCase<E, J, D>>>,
    Json(payload): Json<DispatchEventRequest>,
) -> Result<Json<DispatchEventResponse>, AppError>
where
    E: EndpointRepository + 'static,
    J: DeliveryJobRepository + 'static,
    D: DeliveryService + 'static,
{
    payload.validate()?;
    let event: EventType = payload.event.parse()?;

    let deliveries = use_case
        .execute(
            event,
            payload.data,
            payload.tenant_id.as_deref(),
            payload.metadata,
        )
        .await?;

    Ok(Json(DispatchEventResponse { deliveries }))
}
