//! Devices, parts, stock movements and repair history.

use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{AppError, Result};
use crate::models::{DevicePart, MovementType, PartMovement, RepairHistory, StockError};

/// Locks a part row until the surrounding transaction ends.
pub async fn lock_part(conn: &mut PgConnection, part_id: i64) -> Result<DevicePart> {
    sqlx::query_as::<_, DevicePart>("SELECT * FROM device_parts WHERE id = $1 FOR UPDATE")
        .bind(part_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("part", part_id))
}

pub async fn get_part(db: &Database, part_id: i64) -> Result<DevicePart> {
    sqlx::query_as::<_, DevicePart>("SELECT * FROM device_parts WHERE id = $1")
        .bind(part_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("part", part_id))
}

/// Applies a movement to a locked shop part: checks stock for consuming
/// movements, updates the quantity and appends the log row.
pub async fn apply_movement(
    conn: &mut PgConnection,
    part: &DevicePart,
    movement_type: MovementType,
    quantity: i32,
    notes: &str,
    actor: Option<Uuid>,
) -> Result<(DevicePart, PartMovement)> {
    if quantity <= 0 {
        return Err(StockError::NonPositive.into());
    }
    if !part.is_shop_owned() {
        return Err(AppError::field(
            "part_id",
            "customer-owned parts are not tracked in shop stock",
        ));
    }
    if movement_type.consumes_stock() {
        part.remaining_after(quantity)?;
    }
    let delta = movement_type.delta(quantity);

    let updated = sqlx::query_as::<_, DevicePart>(
        r#"
        UPDATE device_parts
        SET quantity = quantity + $2,
            status = CASE WHEN quantity + $2 <= 0 THEN 'out_of_stock'::part_status
                          WHEN status = 'out_of_stock' THEN 'in_stock'::part_status
                          ELSE status END
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(part.id)
    .bind(delta)
    .fetch_one(&mut *conn)
    .await?;

    let movement = sqlx::query_as::<_, PartMovement>(
        r#"
        INSERT INTO part_movements (part_id, quantity, movement_type, notes, created_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(part.id)
    .bind(delta)
    .bind(movement_type)
    .bind(notes)
    .bind(actor)
    .fetch_one(&mut *conn)
    .await?;

    log::info!(
        "part {} {:?} {} -> quantity {}",
        part.id,
        movement_type,
        delta,
        updated.quantity
    );
    Ok((updated, movement))
}

pub async fn movements_for(db: &Database, part_id: i64) -> Result<Vec<PartMovement>> {
    let movements = sqlx::query_as::<_, PartMovement>(
        "SELECT * FROM part_movements WHERE part_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(part_id)
    .fetch_all(db)
    .await?;
    Ok(movements)
}

/// Standalone parts whose stock is low or exhausted.
pub async fn low_stock_parts(db: &Database) -> Result<Vec<DevicePart>> {
    let parts = sqlx::query_as::<_, DevicePart>(
        r#"
        SELECT * FROM device_parts
        WHERE device_id IS NULL AND (quantity <= 0 OR quantity < minimum_stock)
        ORDER BY quantity, name
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(parts)
}

pub async fn insert_repair_history(
    conn: &mut PgConnection,
    device_id: i64,
    booking_id: i64,
    technician_id: Option<i64>,
    diagnosis: &str,
    parts: &[i64],
) -> Result<i64> {
    let history_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO device_repair_history (device_id, booking_id, technician_id, diagnosis)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(device_id)
    .bind(booking_id)
    .bind(technician_id)
    .bind(diagnosis)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO repair_history_parts (history_id, part_id)
        SELECT $1, UNNEST($2::BIGINT[])
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(history_id)
    .bind(parts)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE devices SET repair_status = 'completed' WHERE id = $1")
        .bind(device_id)
        .execute(&mut *conn)
        .await?;

    Ok(history_id)
}

pub async fn repair_history(db: &Database, device_id: i64) -> Result<Vec<RepairHistory>> {
    let history = sqlx::query_as::<_, RepairHistory>(
        r#"
        SELECT h.id, h.device_id, h.booking_id, h.technician_id, h.diagnosis, h.repair_date,
               COALESCE(ARRAY_AGG(p.part_id) FILTER (WHERE p.part_id IS NOT NULL), '{}') AS parts_replaced
        FROM device_repair_history h
        LEFT JOIN repair_history_parts p ON p.history_id = h.id
        WHERE h.device_id = $1
        GROUP BY h.id
        ORDER BY h.repair_date DESC
        "#,
    )
    .bind(device_id)
    .fetch_all(db)
    .await?;
    Ok(history)
}
