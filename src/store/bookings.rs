//! Booking engine. Every write runs in one database transaction: the technician
//! row is locked while the slot is checked, each shop part row is locked while
//! its stock is consumed, and the booking's payment transaction is written
//! alongside the booking.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::database::Database;
use crate::error::{AppError, Result};
use crate::models::booking::job_card_number;
use crate::models::catalog::DEFAULT_SERVICE_MINUTES;
use crate::models::{
    Billable, Booking, BookingPart, BookingStatus, BookingView, MovementType, PartRequest,
    PricedService, StaffProfile, StockError, TransactionType,
};
use crate::scheduling::{check_transition, find_overlap, ScheduleRules, ScheduleViolation, Slot};
use crate::store::finances::{self, NewTransaction};
use crate::store::inventory;

#[derive(Debug, Clone, Deserialize)]
pub struct BookingDraft {
    pub customer_id: i64,
    pub technician_id: Option<i64>,
    pub detailed_service_id: i64,
    pub device_id: Option<i64>,
    pub scheduled_time: DateTime<Utc>,
    #[serde(default = "pending")]
    pub status: BookingStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub diagnosis: String,
    #[serde(default)]
    pub parts: Vec<PartRequest>,
}

fn pending() -> BookingStatus {
    BookingStatus::Pending
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingPatch {
    pub technician_id: Option<i64>,
    #[serde(default)]
    pub unassign_technician: bool,
    pub detailed_service_id: Option<i64>,
    pub device_id: Option<i64>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub status: Option<BookingStatus>,
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
    /// Replaces the whole parts list when present.
    pub parts: Option<Vec<PartRequest>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BookingScope {
    pub customer_id: Option<i64>,
    pub technician_id: Option<i64>,
    pub status: Option<BookingStatus>,
}

pub async fn priced_service(conn: &mut PgConnection, detailed_service_id: i64) -> Result<PricedService> {
    sqlx::query_as::<_, PricedService>(
        r#"
        SELECT d.id, d.service_id, s.name AS service_name, d.device_type, d.price,
               s.estimated_minutes
        FROM detailed_services d
        JOIN services s ON s.id = d.service_id
        WHERE d.id = $1
        "#,
    )
    .bind(detailed_service_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::not_found("detailed service", detailed_service_id))
}

async fn lock_technician(conn: &mut PgConnection, technician_id: i64) -> Result<StaffProfile> {
    sqlx::query_as::<_, StaffProfile>("SELECT * FROM staff_profiles WHERE id = $1 FOR UPDATE")
        .bind(technician_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("technician", technician_id))
}

fn slot_statuses() -> Vec<&'static str> {
    BookingStatus::ALL
        .into_iter()
        .filter(|status| status.occupies_slot())
        .map(BookingStatus::as_str)
        .collect()
}

/// Slot-holding bookings of a technician whose own duration reaches into `[start, end)`.
async fn technician_slots(
    conn: &mut PgConnection,
    technician_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Slot>> {
    let slots = sqlx::query_as::<_, Slot>(
        r#"
        SELECT b.id AS booking_id, b.scheduled_time,
               COALESCE(NULLIF(s.estimated_minutes, 0), $5)::BIGINT AS minutes
        FROM bookings b
        JOIN detailed_services d ON d.id = b.detailed_service_id
        JOIN services s ON s.id = d.service_id
        WHERE b.technician_id = $1
          AND b.status::TEXT = ANY($4)
          AND b.scheduled_time < $3
          AND b.scheduled_time
              + COALESCE(NULLIF(s.estimated_minutes, 0), $5) * INTERVAL '1 minute' > $2
        "#,
    )
    .bind(technician_id)
    .bind(start)
    .bind(end)
    .bind(slot_statuses())
    .bind(DEFAULT_SERVICE_MINUTES)
    .fetch_all(conn)
    .await?;
    Ok(slots)
}

/// Business hours, technician availability and slot overlap, in that order. The
/// technician row stays locked until the caller's transaction ends.
async fn check_schedule(
    conn: &mut PgConnection,
    rules: &ScheduleRules,
    technician_id: Option<i64>,
    service: &PricedService,
    scheduled_time: DateTime<Utc>,
    exclude: Option<i64>,
) -> Result<()> {
    let technician = match technician_id {
        Some(id) => Some(lock_technician(&mut *conn, id).await?),
        None => None,
    };
    rules.check(scheduled_time, technician.as_ref().map(|t| &t.availability.0))?;

    let Some(technician_id) = technician_id else {
        return Ok(());
    };

    let end = scheduled_time + service.duration();
    let slots = technician_slots(&mut *conn, technician_id, scheduled_time, end).await?;
    if let Some(booking_id) = find_overlap(scheduled_time, service.duration_minutes(), &slots, exclude) {
        return Err(ScheduleViolation::SlotConflict { booking_id }.into());
    }
    Ok(())
}

async fn check_device_owner(
    conn: &mut PgConnection,
    customer_id: i64,
    device_id: Option<i64>,
) -> Result<()> {
    let Some(device_id) = device_id else {
        return Ok(());
    };
    let owners: Option<(Option<Uuid>, Uuid)> = sqlx::query_as(
        r#"
        SELECT d.owner_id, c.account_id
        FROM devices d, customer_profiles c
        WHERE d.id = $1 AND c.id = $2
        "#,
    )
    .bind(device_id)
    .bind(customer_id)
    .fetch_optional(conn)
    .await?;

    match owners {
        None => Err(AppError::field("device_id", "device or customer does not exist")),
        Some((Some(owner), customer)) if owner != customer => Err(AppError::field(
            "device_id",
            "device does not belong to this customer",
        )),
        Some(_) => Ok(()),
    }
}

/// Collapses repeated part ids and orders them so concurrent bookings lock
/// parts in the same order.
fn merge_requests(requests: &[PartRequest]) -> Result<BTreeMap<i64, i32>> {
    let mut merged = BTreeMap::new();
    for request in requests {
        if request.quantity <= 0 {
            return Err(StockError::NonPositive.into());
        }
        let total: &mut i32 = merged.entry(request.part_id).or_insert(0);
        *total = total
            .checked_add(request.quantity)
            .ok_or(StockError::TooLarge { part_id: request.part_id })?;
    }
    Ok(merged)
}

async fn attach_parts(
    conn: &mut PgConnection,
    booking_id: i64,
    device_id: Option<i64>,
    requests: &[PartRequest],
    actor: Option<Uuid>,
) -> Result<Vec<BookingPart>> {
    let note = format!("booking {}", job_card_number(booking_id));
    let mut attached = Vec::new();

    for (part_id, quantity) in merge_requests(requests)? {
        let part = inventory::lock_part(&mut *conn, part_id).await?;
        match part.device_id {
            Some(part_device) if Some(part_device) != device_id => {
                return Err(AppError::PartDeviceMismatch { part_id, part_device });
            }
            Some(_) => {}
            None => {
                inventory::apply_movement(&mut *conn, &part, MovementType::Repair, quantity, &note, actor)
                    .await?;
            }
        }

        let line = sqlx::query_as::<_, BookingPart>(
            r#"
            INSERT INTO booking_parts (booking_id, part_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(booking_id)
        .bind(part_id)
        .bind(quantity)
        .bind(part.unit_price())
        .fetch_one(&mut *conn)
        .await?;
        attached.push(line);
    }

    Ok(attached)
}

/// Fails when a line on the booking is a customer part bound to a device other
/// than `device_id`.
async fn check_bound_parts(
    conn: &mut PgConnection,
    booking_id: i64,
    device_id: Option<i64>,
) -> Result<()> {
    let stray: Option<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT p.id, p.device_id
        FROM booking_parts bp
        JOIN device_parts p ON p.id = bp.part_id
        WHERE bp.booking_id = $1
          AND p.device_id IS NOT NULL
          AND p.device_id IS DISTINCT FROM $2
        ORDER BY p.id
        LIMIT 1
        "#,
    )
    .bind(booking_id)
    .bind(device_id)
    .fetch_optional(conn)
    .await?;

    match stray {
        Some((part_id, part_device)) => Err(AppError::PartDeviceMismatch { part_id, part_device }),
        None => Ok(()),
    }
}

/// Returns every shop part on the booking to stock and drops the lines.
async fn release_parts(conn: &mut PgConnection, booking_id: i64, actor: Option<Uuid>) -> Result<()> {
    let lines = sqlx::query_as::<_, BookingPart>(
        "SELECT * FROM booking_parts WHERE booking_id = $1 ORDER BY part_id",
    )
    .bind(booking_id)
    .fetch_all(&mut *conn)
    .await?;

    let note = format!("booking {} released", job_card_number(booking_id));
    for line in &lines {
        let part = inventory::lock_part(&mut *conn, line.part_id).await?;
        if part.is_shop_owned() {
            inventory::apply_movement(
                &mut *conn,
                &part,
                MovementType::RepairReversal,
                line.quantity,
                &note,
                actor,
            )
            .await?;
        }
    }

    sqlx::query("DELETE FROM booking_parts WHERE booking_id = $1")
        .bind(booking_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn refresh_parts_cost(conn: &mut PgConnection, booking_id: i64) -> Result<Decimal> {
    let cost: Decimal = sqlx::query_scalar(
        r#"
        UPDATE bookings
        SET total_parts_cost = (SELECT COALESCE(SUM(unit_price * quantity), 0)
                                FROM booking_parts WHERE booking_id = $1),
            updated_at = NOW()
        WHERE id = $1
        RETURNING total_parts_cost
        "#,
    )
    .bind(booking_id)
    .fetch_one(conn)
    .await?;
    Ok(cost)
}

async fn parts_of<'e>(db: impl sqlx::PgExecutor<'e>, booking_id: i64) -> Result<Vec<BookingPart>> {
    let parts = sqlx::query_as::<_, BookingPart>(
        "SELECT * FROM booking_parts WHERE booking_id = $1 ORDER BY id",
    )
    .bind(booking_id)
    .fetch_all(db)
    .await?;
    Ok(parts)
}

async fn fetch_booking<'e>(db: impl sqlx::PgExecutor<'e>, id: i64) -> Result<Booking> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("booking", id))
}

pub async fn create_booking(
    db: &Database,
    rules: &ScheduleRules,
    reference_prefix: &str,
    draft: &BookingDraft,
    actor: Option<Uuid>,
) -> Result<BookingView> {
    if matches!(draft.status, BookingStatus::Completed | BookingStatus::Cancelled) {
        return Err(AppError::field(
            "status",
            "new bookings must be pending, confirmed or in progress",
        ));
    }

    let mut tx = db.begin().await?;
    let service = priced_service(&mut *tx, draft.detailed_service_id).await?;
    check_device_owner(&mut *tx, draft.customer_id, draft.device_id).await?;
    check_schedule(
        &mut *tx,
        rules,
        draft.technician_id,
        &service,
        draft.scheduled_time,
        None,
    )
    .await?;

    let booking = sqlx::query_as::<_, Booking>(
        r#"
        INSERT INTO bookings (customer_id, technician_id, detailed_service_id, device_id, status,
                              scheduled_time, notes, diagnosis)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(draft.customer_id)
    .bind(draft.technician_id)
    .bind(draft.detailed_service_id)
    .bind(draft.device_id)
    .bind(draft.status)
    .bind(draft.scheduled_time)
    .bind(&draft.notes)
    .bind(&draft.diagnosis)
    .fetch_one(&mut *tx)
    .await?;

    let parts = attach_parts(&mut *tx, booking.id, draft.device_id, &draft.parts, actor).await?;
    let parts_cost = refresh_parts_cost(&mut *tx, booking.id).await?;

    finances::insert_transaction(
        &mut *tx,
        reference_prefix,
        &NewTransaction {
            billable: Billable::Booking(booking.id),
            transaction_type: TransactionType::BookingPayment,
            total_amount: service.price + parts_cost,
            amount_paid: Decimal::ZERO,
            payment_method: None,
            notes: &format!("{} for job card {}", service.service_name, booking.job_card_number()),
            created_by: actor,
        },
    )
    .await?;

    let booking = fetch_booking(&mut *tx, booking.id).await?;
    tx.commit().await?;

    log::info!(
        "booking {} created for customer {} at {}",
        booking.job_card_number(),
        booking.customer_id,
        booking.scheduled_time
    );
    Ok(BookingView::new(booking, parts))
}

pub async fn update_booking(
    db: &Database,
    rules: &ScheduleRules,
    id: i64,
    patch: &BookingPatch,
    actor: Option<Uuid>,
) -> Result<BookingView> {
    let mut tx = db.begin().await?;
    let current = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("booking", id))?;

    let status = patch.status.unwrap_or(current.status);
    check_transition(current.status, status)?;

    let technician_id = if patch.unassign_technician {
        None
    } else {
        patch.technician_id.or(current.technician_id)
    };
    let detailed_service_id = patch.detailed_service_id.unwrap_or(current.detailed_service_id);
    let device_id = patch.device_id.or(current.device_id);
    let scheduled_time = patch.scheduled_time.unwrap_or(current.scheduled_time);

    let service = priced_service(&mut *tx, detailed_service_id).await?;
    if patch.device_id.is_some() {
        check_device_owner(&mut *tx, current.customer_id, device_id).await?;
    }
    if !matches!(status, BookingStatus::Cancelled | BookingStatus::Completed) {
        check_schedule(&mut *tx, rules, technician_id, &service, scheduled_time, Some(id)).await?;
    }

    let cancelling = status == BookingStatus::Cancelled && current.status != BookingStatus::Cancelled;
    let replacing_parts = patch.parts.is_some() && !cancelling;
    if cancelling || replacing_parts {
        release_parts(&mut *tx, id, actor).await?;
    }
    if replacing_parts {
        if let Some(requests) = &patch.parts {
            attach_parts(&mut *tx, id, device_id, requests, actor).await?;
        }
    }
    if device_id != current.device_id {
        check_bound_parts(&mut *tx, id, device_id).await?;
    }

    sqlx::query(
        r#"
        UPDATE bookings
        SET technician_id = $2, detailed_service_id = $3, device_id = $4, scheduled_time = $5,
            status = $6, notes = COALESCE($7, notes), diagnosis = COALESCE($8, diagnosis),
            is_active = $9, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(technician_id)
    .bind(detailed_service_id)
    .bind(device_id)
    .bind(scheduled_time)
    .bind(status)
    .bind(&patch.notes)
    .bind(&patch.diagnosis)
    .bind(status != BookingStatus::Cancelled)
    .execute(&mut *tx)
    .await?;

    let parts_cost = refresh_parts_cost(&mut *tx, id).await?;
    if cancelling || replacing_parts || detailed_service_id != current.detailed_service_id {
        finances::retotal_booking_transaction(&mut *tx, id, service.price + parts_cost).await?;
    }

    let booking = fetch_booking(&mut *tx, id).await?;
    let parts = parts_of(&mut *tx, id).await?;

    if status == BookingStatus::Completed && current.status != BookingStatus::Completed {
        if let Some(device_id) = booking.device_id {
            let replaced: Vec<i64> = parts.iter().map(|p| p.part_id).collect();
            inventory::insert_repair_history(
                &mut *tx,
                device_id,
                id,
                booking.technician_id,
                &booking.diagnosis,
                &replaced,
            )
            .await?;
        }
    }

    tx.commit().await?;
    log::info!(
        "booking {} updated: {} -> {}",
        booking.job_card_number(),
        current.status.as_str(),
        status.as_str()
    );
    Ok(BookingView::new(booking, parts))
}

pub async fn get_booking(db: &Database, id: i64) -> Result<BookingView> {
    let booking = fetch_booking(db, id).await?;
    let parts = parts_of(db, id).await?;
    Ok(BookingView::new(booking, parts))
}

pub async fn list_bookings(db: &Database, scope: BookingScope) -> Result<Vec<BookingView>> {
    let bookings = sqlx::query_as::<_, Booking>(
        r#"
        SELECT * FROM bookings
        WHERE ($1::BIGINT IS NULL OR customer_id = $1)
          AND ($2::BIGINT IS NULL OR technician_id = $2)
          AND ($3::booking_status IS NULL OR status = $3)
        ORDER BY scheduled_time DESC
        "#,
    )
    .bind(scope.customer_id)
    .bind(scope.technician_id)
    .bind(scope.status)
    .fetch_all(db)
    .await?;

    let mut views = Vec::with_capacity(bookings.len());
    for booking in bookings {
        let parts = parts_of(db, booking.id).await?;
        views.push(BookingView::new(booking, parts));
    }
    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PaymentStatus;
    use crate::store::testing;

    #[test]
    fn part_requests_are_merged_and_ordered() {
        let requests = vec![
            PartRequest { part_id: 9, quantity: 1 },
            PartRequest { part_id: 2, quantity: 2 },
            PartRequest { part_id: 9, quantity: 3 },
        ];
        let merged: Vec<_> = merge_requests(&requests).unwrap().into_iter().collect();
        assert_eq!(merged, vec![(2, 2), (9, 4)]);
    }

    #[test]
    fn non_positive_part_quantities_are_rejected() {
        let requests = vec![PartRequest { part_id: 1, quantity: 0 }];
        assert!(matches!(
            merge_requests(&requests),
            Err(AppError::Stock(StockError::NonPositive))
        ));
    }

    #[test]
    fn repeated_lines_that_overflow_are_rejected() {
        let requests = vec![
            PartRequest { part_id: 1, quantity: i32::MAX },
            PartRequest { part_id: 1, quantity: 1 },
        ];
        assert!(matches!(
            merge_requests(&requests),
            Err(AppError::Stock(StockError::TooLarge { part_id: 1 }))
        ));
    }

    #[test]
    fn only_confirmed_and_in_progress_bookings_hold_slots() {
        assert_eq!(slot_statuses(), vec!["confirmed", "in_progress"]);
    }

    fn cancel() -> BookingPatch {
        BookingPatch {
            status: Some(BookingStatus::Cancelled),
            ..BookingPatch::default()
        }
    }

    #[tokio::test]
    async fn booking_parts_take_stock_and_cancelling_returns_it() {
        let Some(db) = testing::database().await else {
            return;
        };
        let customer = testing::customer(&db).await;
        let service = testing::detailed_service(&db, 1000, 60).await;
        let part = testing::shop_part(&db, 2, 200).await;

        let mut draft = testing::draft(&customer, service, None, testing::at(3, 10));
        draft.parts = vec![PartRequest { part_id: part, quantity: 3 }];
        let err = create_booking(&db, &testing::rules(), "TST", &draft, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Stock(StockError::Insufficient { .. })));
        assert_eq!(testing::stock_of(&db, part).await, 2);

        draft.parts = vec![PartRequest { part_id: part, quantity: 2 }];
        let view = create_booking(&db, &testing::rules(), "TST", &draft, None)
            .await
            .unwrap();
        assert_eq!(view.booking.total_parts_cost, Decimal::from(400));
        assert_eq!(testing::stock_of(&db, part).await, 0);
        assert_eq!(
            testing::booking_transaction(&db, view.booking.id).await.total_amount,
            Decimal::from(1400)
        );

        let cancelled = update_booking(&db, &testing::rules(), view.booking.id, &cancel(), None)
            .await
            .unwrap();
        assert!(cancelled.parts_used.is_empty());
        assert!(!cancelled.booking.is_active);
        assert_eq!(testing::stock_of(&db, part).await, 2);
    }

    #[tokio::test]
    async fn paid_booking_with_parts_can_still_be_cancelled() {
        let Some(db) = testing::database().await else {
            return;
        };
        let customer = testing::customer(&db).await;
        let service = testing::detailed_service(&db, 1000, 60).await;
        let part = testing::shop_part(&db, 5, 200).await;

        let mut draft = testing::draft(&customer, service, None, testing::at(3, 11));
        draft.parts = vec![PartRequest { part_id: part, quantity: 1 }];
        let view = create_booking(&db, &testing::rules(), "TST", &draft, None)
            .await
            .unwrap();
        let transaction = testing::booking_transaction(&db, view.booking.id).await;
        assert_eq!(transaction.total_amount, Decimal::from(1200));

        let receipt = testing::unique();
        finances::record_payment(
            &db,
            transaction.id,
            &finances::NewPayment {
                amount: Decimal::from(1200),
                payment_method: crate::models::PaymentMethod::Cash,
                receipt_number: &receipt,
                notes: "",
                recorded_by: None,
            },
        )
        .await
        .unwrap();

        let cancelled = update_booking(&db, &testing::rules(), view.booking.id, &cancel(), None)
            .await
            .unwrap();
        assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(testing::stock_of(&db, part).await, 5);

        let settled = finances::get_transaction(&db, transaction.id).await.unwrap();
        assert_eq!(settled.total_amount, Decimal::from(1200));
        assert_eq!(settled.amount_paid, Decimal::from(1200));
        assert_eq!(settled.status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn moving_to_another_device_rejects_parts_bound_to_the_old_one() {
        let Some(db) = testing::database().await else {
            return;
        };
        let customer = testing::customer(&db).await;
        let service = testing::detailed_service(&db, 1000, 60).await;
        let first_device = testing::device(&db, customer.account_id).await;
        let second_device = testing::device(&db, customer.account_id).await;
        let bound = testing::customer_part(&db, first_device).await;

        let mut draft = testing::draft(&customer, service, None, testing::at(3, 12));
        draft.device_id = Some(first_device);
        draft.parts = vec![PartRequest { part_id: bound, quantity: 1 }];
        let view = create_booking(&db, &testing::rules(), "TST", &draft, None)
            .await
            .unwrap();

        let mut patch = BookingPatch {
            device_id: Some(second_device),
            ..BookingPatch::default()
        };
        let err = update_booking(&db, &testing::rules(), view.booking.id, &patch, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::PartDeviceMismatch { part_id, part_device }
                if part_id == bound && part_device == first_device
        ));
        let unchanged = get_booking(&db, view.booking.id).await.unwrap();
        assert_eq!(unchanged.booking.device_id, Some(first_device));
        assert_eq!(unchanged.parts_used.len(), 1);

        patch.parts = Some(Vec::new());
        let moved = update_booking(&db, &testing::rules(), view.booking.id, &patch, None)
            .await
            .unwrap();
        assert_eq!(moved.booking.device_id, Some(second_device));
        assert!(moved.parts_used.is_empty());
    }

    #[tokio::test]
    async fn rescheduling_ignores_the_booking_being_moved() {
        let Some(db) = testing::database().await else {
            return;
        };
        let customer = testing::customer(&db).await;
        let technician = testing::technician(&db).await;
        let service = testing::detailed_service(&db, 1000, 60).await;
        let rules = testing::rules();

        let first = create_booking(
            &db,
            &rules,
            "TST",
            &testing::draft(&customer, service, Some(technician), testing::at(4, 10)),
            None,
        )
        .await
        .unwrap();

        let later = BookingPatch {
            scheduled_time: Some(testing::at(4, 10) + chrono::Duration::minutes(30)),
            ..BookingPatch::default()
        };
        update_booking(&db, &rules, first.booking.id, &later, None)
            .await
            .unwrap();

        let clash = testing::draft(&customer, service, Some(technician), testing::at(4, 11));
        let err = create_booking(&db, &rules, "TST", &clash, None).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidSchedule(ScheduleViolation::SlotConflict { booking_id })
                if booking_id == first.booking.id
        ));

        let after = testing::draft(
            &customer,
            service,
            Some(technician),
            testing::at(4, 11) + chrono::Duration::minutes(30),
        );
        assert!(create_booking(&db, &rules, "TST", &after, None).await.is_ok());
    }

    #[tokio::test]
    async fn repairs_longer_than_a_day_block_the_next_morning() {
        let Some(db) = testing::database().await else {
            return;
        };
        let customer = testing::customer(&db).await;
        let technician = testing::technician(&db).await;
        let overhaul = testing::detailed_service(&db, 9000, 30 * 60).await;
        let quick = testing::detailed_service(&db, 500, 60).await;
        let rules = testing::rules();

        let first = create_booking(
            &db,
            &rules,
            "TST",
            &testing::draft(&customer, overhaul, Some(technician), testing::at(5, 10)),
            None,
        )
        .await
        .unwrap();

        let next_day = testing::draft(&customer, quick, Some(technician), testing::at(6, 10));
        let err = create_booking(&db, &rules, "TST", &next_day, None).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidSchedule(ScheduleViolation::SlotConflict { booking_id })
                if booking_id == first.booking.id
        ));

        let after = testing::draft(&customer, quick, Some(technician), testing::at(6, 17));
        assert!(create_booking(&db, &rules, "TST", &after, None).await.is_ok());
    }
}
