// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::delivery::DeliveryStatus;
use crate::domain::models::endpoint::EndpointStatus;
use sea_orm::entity::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum SeaEndpointStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "disabled")]
    Disabled,
}

impl From<EndpointStatus> for SeaEndpointStatus {
    fn from(status: EndpointStatus) -> Self {
        match status {
            EndpointStatus::Active => SeaEndpointStatus::Active,
            EndpointStatus::Disabled => SeaEndpointStatus::Disabled,
        }
    }
}

impl From<SeaEndpointStatus> for EndpointStatus {
    fn from(status: SeaEndpointStatus) -> Self {
        match status {
            SeaEndpointStatus::Active => EndpointStatus::Active,
            SeaEndpointStatus::Disabled => EndpointStatus::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum SeaDeliveryStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "in_flight")]
    InFlight,
    #[sea_orm(string_value = "retry_scheduled")]
    RetryScheduled,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl From<DeliveryStatus> for SeaDeliveryStatus {
    fn from(status: DeliveryStatus) -> Self {
        match status {
            DeliveryStatus::Pending => SeaDeliveryStatus::Pending,
            DeliveryStatus::InFlight => SeaDeliveryStatus::InFlight,
            DeliveryStatus::RetryScheduled => SeaDeliveryStatus::RetryScheduled,
            DeliveryStatus::Delivered => SeaDeliveryStatus::Delivered,
            DeliveryStatus::Failed => SeaDeliveryStatus::Failed,
            DeliveryStatus::Cancelled => SeaDeliveryStatus::Cancelled,
        }
    }
}

impl From<SeaDeliveryStatus> for DeliveryStatus {
    fn from(status: SeaDeliveryStatus) -> Self {
        match status {
            SeaDeliveryStatus::Pending => DeliveryStatus::Pending,
            SeaDeliveryStatus::InFlight => DeliveryStatus::InFlight,
            SeaDeliveryStatus::RetryScheduled => DeliveryStatus::RetryScheduled,
            SeaDeliveryStatus::Delivered => DeliveryStatus::Delivered,
            SeaDeliveryStatus::Failed => DeliveryStatus::Failed,
            SeaDeliveryStatus::Cancelled => DeliveryStatus::Cancelled,
        }
    }
}
