// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::sea_orm_active_enums::SeaEndpointStatus;
use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_endpoints")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub url: String,
    pub secret: Option<String>,
    /// 事件线上名称的JSON数组
    pub subscribed_events: JsonValue,
    /// `[[name, value], ...]`，保持插入顺序
    pub custom_headers: JsonValue,
    pub max_retries: i32,
    pub retry_delay_seconds: i32,
    pub status: SeaEndpointStatus,
    pub delivered_count: i64,
    pub failed_count: i64,
    pub last_delivered_at: Option<DateTimeWithTimeZone>,
    pub last_failed_at: Option<DateTimeWithTimeZone>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::delivery_job::Entity")]
    DeliveryJobs,
}

impl Related<super::delivery_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
