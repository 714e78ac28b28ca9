use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::CurrentAccount;
use crate::models::{
    Device, DevicePart, DevicePartView, DeviceType, MovementType, PartMovement, PartStatus,
    RepairHistory, RepairStatus, SaleStatus,
};
use crate::state::AppState;
use crate::store::inventory;
use crate::validation::FieldErrors;

#[derive(Debug, Deserialize)]
pub struct DeviceForm {
    /// Staff may register a device for any account; customers always own theirs.
    pub owner_id: Option<Uuid>,
    #[serde(default = "laptop")]
    pub device_type: DeviceType,
    pub brand: String,
    pub model: String,
    pub serial_number: String,
    pub repair_status: Option<RepairStatus>,
    pub sale_status: Option<SaleStatus>,
}

fn laptop() -> DeviceType {
    DeviceType::Laptop
}

#[derive(Debug, Deserialize)]
pub struct DeviceStatusUpdate {
    pub repair_status: Option<RepairStatus>,
    pub sale_status: Option<SaleStatus>,
}

#[derive(Debug, Deserialize)]
pub struct PartForm {
    pub device_id: Option<i64>,
    pub name: String,
    pub model: String,
    pub serial_number: String,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub quantity: i32,
    pub status: Option<PartStatus>,
    #[serde(default)]
    pub warranty_months: i32,
    #[serde(default = "one")]
    pub minimum_stock: i32,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct MovementForm {
    pub movement_type: MovementType,
    pub quantity: i32,
    #[serde(default)]
    pub notes: String,
}

fn require_text(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "this field is required");
    }
}

impl PartForm {
    fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "name", &self.name);
        require_text(&mut errors, "model", &self.model);
        require_text(&mut errors, "serial_number", &self.serial_number);
        if self.quantity < 0 {
            errors.add("quantity", "quantity cannot be negative");
        }
        if self.warranty_months < 0 {
            errors.add("warranty_months", "warranty cannot be negative");
        }
        if self.minimum_stock < 0 {
            errors.add("minimum_stock", "minimum stock cannot be negative");
        }
        if matches!(self.price, Some(price) if price < Decimal::ZERO) {
            errors.add("price", "price cannot be negative");
        }
        match self.device_id {
            Some(_) if self.quantity > 1 => {
                errors.add("quantity", "a device-bound part has a quantity of at most 1");
            }
            None if self.quantity < self.minimum_stock => {
                errors.add("quantity", "stock must start at or above the minimum stock level");
            }
            _ => {}
        }
        errors
    }
}

async fn visible_device(state: &AppState, current: &CurrentAccount, id: i64) -> Result<Device> {
    let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("device", id))?;
    if !current.role.is_staff_side() && device.owner_id != Some(current.account.id) {
        return Err(AppError::not_found("device", id));
    }
    Ok(device)
}

pub async fn create_device(
    State(state): State<AppState>,
    current: CurrentAccount,
    Json(form): Json<DeviceForm>,
) -> Result<(StatusCode, Json<Device>)> {
    let mut errors = FieldErrors::new();
    require_text(&mut errors, "brand", &form.brand);
    require_text(&mut errors, "model", &form.model);
    require_text(&mut errors, "serial_number", &form.serial_number);
    errors.into_result()?;

    let owner_id = if current.role.is_staff_side() {
        form.owner_id
    } else {
        Some(current.account.id)
    };

    let device = sqlx::query_as::<_, Device>(
        r#"
        INSERT INTO devices (owner_id, device_type, brand, model, serial_number, repair_status, sale_status)
        VALUES ($1, $2, $3, $4, $5, COALESCE($6, 'in_progress'::repair_status), $7)
        RETURNING *
        "#,
    )
    .bind(owner_id)
    .bind(form.device_type)
    .bind(form.brand.trim())
    .bind(form.model.trim())
    .bind(form.serial_number.trim())
    .bind(form.repair_status)
    .bind(form.sale_status)
    .fetch_one(&state.db)
    .await?;

    log::info!("device {} ({}) registered", device.id, device.serial_number);
    Ok((StatusCode::CREATED, Json(device)))
}

pub async fn list_devices(
    State(state): State<AppState>,
    current: CurrentAccount,
) -> Result<Json<Vec<Device>>> {
    let owner = (!current.role.is_staff_side()).then_some(current.account.id);
    let devices = sqlx::query_as::<_, Device>(
        "SELECT * FROM devices WHERE ($1::UUID IS NULL OR owner_id = $1) ORDER BY created_at DESC",
    )
    .bind(owner)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(devices))
}

pub async fn get_device(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let device = visible_device(&state, &current, id).await?;
    let parts = sqlx::query_as::<_, DevicePart>(
        "SELECT * FROM device_parts WHERE device_id = $1 ORDER BY name",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(json!({
        "device": device,
        "parts": parts.into_iter().map(DevicePartView::from).collect::<Vec<_>>(),
    })))
}

pub async fn update_device_status(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
    Json(update): Json<DeviceStatusUpdate>,
) -> Result<Json<Device>> {
    current.require_staff()?;
    let device = sqlx::query_as::<_, Device>(
        r#"
        UPDATE devices
        SET repair_status = COALESCE($2, repair_status),
            sale_status = COALESCE($3, sale_status)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(update.repair_status)
    .bind(update.sale_status)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("device", id))?;
    Ok(Json(device))
}

pub async fn device_history(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RepairHistory>>> {
    visible_device(&state, &current, id).await?;
    Ok(Json(inventory::repair_history(&state.db, id).await?))
}

pub async fn create_part(
    State(state): State<AppState>,
    current: CurrentAccount,
    Json(form): Json<PartForm>,
) -> Result<(StatusCode, Json<DevicePartView>)> {
    current.require_staff()?;
    form.validate().into_result()?;

    let status = form.status.unwrap_or(if form.quantity > 0 {
        PartStatus::InStock
    } else {
        PartStatus::OutOfStock
    });

    let part = sqlx::query_as::<_, DevicePart>(
        r#"
        INSERT INTO device_parts (device_id, name, model, serial_number, price, quantity, status,
                                  warranty_months, minimum_stock)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(form.device_id)
    .bind(form.name.trim())
    .bind(form.model.trim())
    .bind(form.serial_number.trim())
    .bind(form.price)
    .bind(form.quantity)
    .bind(status)
    .bind(form.warranty_months)
    .bind(form.minimum_stock)
    .fetch_one(&state.db)
    .await?;

    log::info!("part {} ({}) added with quantity {}", part.id, part.name, part.quantity);
    Ok((StatusCode::CREATED, Json(part.into())))
}

pub async fn list_parts(
    State(state): State<AppState>,
    current: CurrentAccount,
) -> Result<Json<Vec<DevicePartView>>> {
    current.require_staff()?;
    let parts = sqlx::query_as::<_, DevicePart>("SELECT * FROM device_parts ORDER BY name, id")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(parts.into_iter().map(DevicePartView::from).collect()))
}

pub async fn get_part(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<DevicePartView>> {
    current.require_staff()?;
    Ok(Json(inventory::get_part(&state.db, id).await?.into()))
}

pub async fn low_stock(
    State(state): State<AppState>,
    current: CurrentAccount,
) -> Result<Json<Vec<DevicePartView>>> {
    current.require_staff()?;
    let parts = inventory::low_stock_parts(&state.db).await?;
    Ok(Json(parts.into_iter().map(DevicePartView::from).collect()))
}

pub async fn record_movement(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
    Json(form): Json<MovementForm>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    current.require_staff()?;

    let mut tx = state.db.begin().await?;
    let part = inventory::lock_part(&mut *tx, id).await?;
    let (part, movement) = inventory::apply_movement(
        &mut *tx,
        &part,
        form.movement_type,
        form.quantity,
        &form.notes,
        Some(current.account.id),
    )
    .await?;
    tx.commit().await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "movement": movement,
            "part": DevicePartView::from(part),
        })),
    ))
}

pub async fn list_movements(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PartMovement>>> {
    current.require_staff()?;
    inventory::get_part(&state.db, id).await?;
    Ok(Json(inventory::movements_for(&state.db, id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(device_id: Option<i64>, quantity: i32, minimum_stock: i32) -> PartForm {
        PartForm {
            device_id,
            name: "Keyboard".to_string(),
            model: "HP 250 G7".to_string(),
            serial_number: "KB-250-01".to_string(),
            price: Some(Decimal::new(250000, 2)),
            quantity,
            status: None,
            warranty_months: 3,
            minimum_stock,
        }
    }

    #[test]
    fn device_bound_part_holds_at_most_one_unit() {
        assert!(form(Some(4), 1, 1).validate().is_empty());
        assert!(form(Some(4), 2, 1).validate().contains("quantity"));
    }

    #[test]
    fn device_bound_part_ignores_minimum_stock() {
        assert!(form(Some(4), 0, 5).validate().is_empty());
    }

    #[test]
    fn standalone_part_starts_at_minimum_stock() {
        assert!(form(None, 3, 3).validate().is_empty());
        assert!(form(None, 2, 3).validate().contains("quantity"));
    }

    #[test]
    fn blank_identifiers_are_rejected() {
        let mut part = form(None, 1, 1);
        part.serial_number = "  ".to_string();
        part.price = Some(Decimal::new(-1, 0));
        let errors = part.validate();
        assert!(errors.contains("serial_number"));
        assert!(errors.contains("price"));
    }
}
