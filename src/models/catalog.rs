use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::inventory::{DevicePart, DeviceType};

/// Duration assumed for a booking whose service has no estimate.
pub const DEFAULT_SERVICE_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServiceCategory {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub id: i64,
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub estimated_minutes: Option<i32>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DetailedService {
    pub id: i64,
    pub service_id: i64,
    pub device_type: DeviceType,
    pub changes_to_make: String,
    pub price: Decimal,
    pub notes: Option<String>,
}

/// A detailed service joined with the parent service's name and estimate, which is
/// what bookings need to price and schedule themselves.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PricedService {
    pub id: i64,
    pub service_id: i64,
    pub service_name: String,
    pub device_type: DeviceType,
    pub price: Decimal,
    pub estimated_minutes: Option<i32>,
}

impl PricedService {
    pub fn duration_minutes(&self) -> i64 {
        service_minutes(self.estimated_minutes)
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes())
    }
}

pub fn service_minutes(estimated: Option<i32>) -> i64 {
    match estimated {
        Some(minutes) if minutes > 0 => i64::from(minutes),
        _ => DEFAULT_SERVICE_MINUTES,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ServicePartRequired {
    pub id: i64,
    pub detailed_service_id: i64,
    pub part_id: i64,
    pub quantity: i32,
    pub mandatory: bool,
}

#[derive(Debug, Serialize)]
pub struct ServicePartRequiredView {
    #[serde(flatten)]
    pub requirement: ServicePartRequired,
    pub part: DevicePart,
}

#[derive(Debug, Serialize)]
pub struct DetailedServiceView {
    #[serde(flatten)]
    pub detailed: DetailedService,
    pub service: Service,
    pub parts_required: Vec<ServicePartRequiredView>,
}

#[derive(Debug, Serialize)]
pub struct CategoryView {
    #[serde(flatten)]
    pub category: ServiceCategory,
    pub services: Vec<Service>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_invalid_estimate_falls_back_to_an_hour() {
        assert_eq!(service_minutes(None), 60);
        assert_eq!(service_minutes(Some(0)), 60);
        assert_eq!(service_minutes(Some(-15)), 60);
        assert_eq!(service_minutes(Some(90)), 90);
    }
}
