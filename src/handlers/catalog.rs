//! Service catalog: categories, services, device-specific priced variants and
//! the parts each variant requires. Anyone signed in may browse; staff edit.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::database::Database;
use crate::error::{AppError, Result};
use crate::middleware::CurrentAccount;
use crate::models::{
    CategoryView, DetailedService, DetailedServiceView, DeviceType, Service, ServiceCategory,
    ServicePartRequired, ServicePartRequiredView,
};
use crate::state::AppState;
use crate::store::inventory;
use crate::validation::FieldErrors;

#[derive(Debug, Deserialize)]
pub struct CategoryForm {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceForm {
    pub category_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub estimated_minutes: Option<i32>,
    #[serde(default = "active")]
    pub active: bool,
}

fn active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct DetailedServiceForm {
    pub service_id: i64,
    pub device_type: DeviceType,
    pub changes_to_make: String,
    pub price: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartRequiredForm {
    pub part_id: i64,
    #[serde(default = "one")]
    pub quantity: i32,
    #[serde(default = "active")]
    pub mandatory: bool,
}

fn one() -> i32 {
    1
}

impl ServiceForm {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.name.trim().is_empty() {
            errors.add("name", "this field is required");
        }
        if matches!(self.estimated_minutes, Some(minutes) if minutes <= 0) {
            errors.add("estimated_minutes", "estimated duration must be positive");
        }
        errors
    }
}

impl DetailedServiceForm {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.changes_to_make.trim().is_empty() {
            errors.add("changes_to_make", "this field is required");
        }
        if self.price <= Decimal::ZERO {
            errors.add("price", "price must be greater than zero");
        }
        errors
    }
}

async fn fetch_service(db: &Database, id: i64) -> Result<Service> {
    sqlx::query_as::<_, Service>("SELECT * FROM services WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("service", id))
}

async fn parts_required(db: &Database, detailed_service_id: i64) -> Result<Vec<ServicePartRequiredView>> {
    let requirements = sqlx::query_as::<_, ServicePartRequired>(
        "SELECT * FROM service_parts_required WHERE detailed_service_id = $1 ORDER BY id",
    )
    .bind(detailed_service_id)
    .fetch_all(db)
    .await?;

    let mut views = Vec::with_capacity(requirements.len());
    for requirement in requirements {
        let part = inventory::get_part(db, requirement.part_id).await?;
        views.push(ServicePartRequiredView { requirement, part });
    }
    Ok(views)
}

pub async fn create_category(
    State(state): State<AppState>,
    current: CurrentAccount,
    Json(form): Json<CategoryForm>,
) -> Result<(StatusCode, Json<ServiceCategory>)> {
    current.require_staff()?;
    if form.name.trim().is_empty() {
        return Err(AppError::field("name", "this field is required"));
    }
    let category = sqlx::query_as::<_, ServiceCategory>(
        "INSERT INTO service_categories (name, description) VALUES ($1, $2) RETURNING *",
    )
    .bind(form.name.trim())
    .bind(&form.description)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn list_categories(
    State(state): State<AppState>,
    _current: CurrentAccount,
) -> Result<Json<Vec<CategoryView>>> {
    let categories =
        sqlx::query_as::<_, ServiceCategory>("SELECT * FROM service_categories ORDER BY name")
            .fetch_all(&state.db)
            .await?;
    let services = sqlx::query_as::<_, Service>("SELECT * FROM services ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    let views = categories
        .into_iter()
        .map(|category| CategoryView {
            services: services
                .iter()
                .filter(|s| s.category_id == category.id)
                .cloned()
                .collect(),
            category,
        })
        .collect();
    Ok(Json(views))
}

pub async fn get_category(
    State(state): State<AppState>,
    _current: CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<CategoryView>> {
    let category =
        sqlx::query_as::<_, ServiceCategory>("SELECT * FROM service_categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::not_found("category", id))?;
    let services =
        sqlx::query_as::<_, Service>("SELECT * FROM services WHERE category_id = $1 ORDER BY name")
            .bind(id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(CategoryView { category, services }))
}

pub async fn create_service(
    State(state): State<AppState>,
    current: CurrentAccount,
    Json(form): Json<ServiceForm>,
) -> Result<(StatusCode, Json<Service>)> {
    current.require_staff()?;
    form.validate().into_result()?;
    let service = sqlx::query_as::<_, Service>(
        r#"
        INSERT INTO services (category_id, name, description, estimated_minutes, active)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(form.category_id)
    .bind(form.name.trim())
    .bind(&form.description)
    .bind(form.estimated_minutes)
    .bind(form.active)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn list_services(
    State(state): State<AppState>,
    current: CurrentAccount,
) -> Result<Json<Vec<Service>>> {
    // Inactive services stay visible to staff only.
    let services = sqlx::query_as::<_, Service>(
        "SELECT * FROM services WHERE active OR $1 ORDER BY name",
    )
    .bind(current.role.is_staff_side())
    .fetch_all(&state.db)
    .await?;
    Ok(Json(services))
}

pub async fn get_service(
    State(state): State<AppState>,
    _current: CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<Service>> {
    Ok(Json(fetch_service(&state.db, id).await?))
}

pub async fn create_detailed_service(
    State(state): State<AppState>,
    current: CurrentAccount,
    Json(form): Json<DetailedServiceForm>,
) -> Result<(StatusCode, Json<DetailedService>)> {
    current.require_staff()?;
    form.validate().into_result()?;
    let detailed = sqlx::query_as::<_, DetailedService>(
        r#"
        INSERT INTO detailed_services (service_id, device_type, changes_to_make, price, notes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(form.service_id)
    .bind(form.device_type)
    .bind(form.changes_to_make.trim())
    .bind(form.price)
    .bind(&form.notes)
    .fetch_one(&state.db)
    .await?;
    Ok((StatusCode::CREATED, Json(detailed)))
}

pub async fn list_detailed_services(
    State(state): State<AppState>,
    _current: CurrentAccount,
) -> Result<Json<Vec<DetailedService>>> {
    let detailed = sqlx::query_as::<_, DetailedService>(
        "SELECT * FROM detailed_services ORDER BY service_id, device_type",
    )
    .fetch_all(&state.db)
    .await?;
    Ok(Json(detailed))
}

pub async fn get_detailed_service(
    State(state): State<AppState>,
    _current: CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<DetailedServiceView>> {
    let detailed =
        sqlx::query_as::<_, DetailedService>("SELECT * FROM detailed_services WHERE id = $1")
            .bind(id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::not_found("detailed service", id))?;
    let service = fetch_service(&state.db, detailed.service_id).await?;
    let parts_required = parts_required(&state.db, id).await?;
    Ok(Json(DetailedServiceView {
        detailed,
        service,
        parts_required,
    }))
}

pub async fn add_part_required(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
    Json(form): Json<PartRequiredForm>,
) -> Result<(StatusCode, Json<ServicePartRequiredView>)> {
    current.require_staff()?;
    if form.quantity <= 0 {
        return Err(AppError::field("quantity", "quantity must be greater than zero"));
    }
    let part = inventory::get_part(&state.db, form.part_id).await?;
    let requirement = sqlx::query_as::<_, ServicePartRequired>(
        r#"
        INSERT INTO service_parts_required (detailed_service_id, part_id, quantity, mandatory)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(form.part_id)
    .bind(form.quantity)
    .bind(form.mandatory)
    .fetch_one(&state.db)
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(ServicePartRequiredView { requirement, part }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detailed_service_price_must_be_positive() {
        let form = DetailedServiceForm {
            service_id: 1,
            device_type: DeviceType::Laptop,
            changes_to_make: "Replace screen".to_string(),
            price: Decimal::ZERO,
            notes: None,
        };
        assert!(form.validate().contains("price"));
    }

    #[test]
    fn service_estimate_must_be_positive_when_given() {
        let mut form = ServiceForm {
            category_id: 1,
            name: "Screen replacement".to_string(),
            description: None,
            estimated_minutes: Some(0),
            active: true,
        };
        assert!(form.validate().contains("estimated_minutes"));
        form.estimated_minutes = None;
        assert!(form.validate().is_empty());
    }
}
