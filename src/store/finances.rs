//! Transactions, payment records and daily summaries.

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{AppError, Result};
use crate::models::finance::{
    apply_payment, derive_status, format_reference, retotal, summarize, validate_amounts,
};
use crate::models::{
    Billable, BillableKind, FinancialSummary, PaymentMethod, PaymentRecord, PaymentStatus,
    SummaryEntry, Transaction, TransactionRow, TransactionType,
};

pub struct NewTransaction<'a> {
    pub billable: Billable,
    pub transaction_type: TransactionType,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub payment_method: Option<PaymentMethod>,
    pub notes: &'a str,
    pub created_by: Option<Uuid>,
}

pub struct NewPayment<'a> {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub receipt_number: &'a str,
    pub notes: &'a str,
    pub recorded_by: Option<Uuid>,
}

async fn billable_exists(conn: &mut PgConnection, billable: Billable) -> Result<bool> {
    let table = match billable.kind() {
        BillableKind::Booking => "bookings",
        BillableKind::DevicePart => "device_parts",
        BillableKind::StaffProfile => "staff_profiles",
    };
    let exists: bool = sqlx::query_scalar(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
        table
    ))
    .bind(billable.id())
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

async fn next_reference(conn: &mut PgConnection, prefix: &str) -> Result<String> {
    let n: i64 = sqlx::query_scalar("SELECT nextval('transaction_reference_seq')")
        .fetch_one(conn)
        .await?;
    Ok(format_reference(prefix, n))
}

pub async fn insert_transaction(
    conn: &mut PgConnection,
    prefix: &str,
    new: &NewTransaction<'_>,
) -> Result<Transaction> {
    if !new.billable.allows(new.transaction_type) {
        return Err(AppError::field(
            "transaction_type",
            format!(
                "{:?} is not valid for a {:?} transaction",
                new.transaction_type,
                new.billable.kind()
            ),
        ));
    }
    validate_amounts(new.total_amount, new.amount_paid)?;
    if !billable_exists(&mut *conn, new.billable).await? {
        return Err(AppError::not_found("billable", new.billable.id()));
    }

    let reference = next_reference(&mut *conn, prefix).await?;
    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        INSERT INTO transactions (reference_number, billable_kind, billable_id, transaction_type,
                                  total_amount, amount_paid, status, payment_method, notes, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(&reference)
    .bind(new.billable.kind())
    .bind(new.billable.id())
    .bind(new.transaction_type)
    .bind(new.total_amount)
    .bind(new.amount_paid)
    .bind(derive_status(new.total_amount, new.amount_paid))
    .bind(new.payment_method)
    .bind(new.notes)
    .bind(new.created_by)
    .fetch_one(&mut *conn)
    .await?;

    log::info!("transaction {} created for {:?}", reference, new.billable);
    Ok(row.into())
}

pub async fn get_transaction(db: &Database, id: i64) -> Result<Transaction> {
    sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .map(Transaction::from)
        .ok_or_else(|| AppError::not_found("transaction", id))
}

async fn lock_transaction(conn: &mut PgConnection, id: i64) -> Result<Transaction> {
    sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(Transaction::from)
        .ok_or_else(|| AppError::not_found("transaction", id))
}

#[derive(Debug, Default)]
pub struct TransactionFilter {
    pub include_inactive: bool,
    pub billable: Option<Billable>,
    /// Restricts to transactions billing this customer's bookings.
    pub customer_id: Option<i64>,
}

pub async fn list_transactions(db: &Database, filter: &TransactionFilter) -> Result<Vec<Transaction>> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT t.* FROM transactions t
        WHERE ($1 OR t.is_active)
          AND ($2::billable_kind IS NULL OR (t.billable_kind = $2 AND t.billable_id = $3))
          AND ($4::BIGINT IS NULL OR (t.billable_kind = 'booking' AND t.billable_id IN
                (SELECT id FROM bookings WHERE customer_id = $4)))
        ORDER BY t.created_at DESC
        "#,
    )
    .bind(filter.include_inactive)
    .bind(filter.billable.map(Billable::kind))
    .bind(filter.billable.map(Billable::id))
    .bind(filter.customer_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Transaction::from).collect())
}

pub async fn payments_for(db: &Database, transaction_id: i64) -> Result<Vec<PaymentRecord>> {
    let payments = sqlx::query_as::<_, PaymentRecord>(
        "SELECT * FROM payment_records WHERE transaction_id = $1 ORDER BY payment_date, id",
    )
    .bind(transaction_id)
    .fetch_all(db)
    .await?;
    Ok(payments)
}

/// Records a payment under a row lock on the transaction, re-derives its status
/// and mirrors that status onto a billed booking.
pub async fn record_payment(
    db: &Database,
    transaction_id: i64,
    payment: &NewPayment<'_>,
) -> Result<(Transaction, PaymentRecord)> {
    let mut tx = db.begin().await?;
    let transaction = lock_transaction(&mut *tx, transaction_id).await?;
    if !transaction.is_active() {
        return Err(AppError::field("transaction", "transaction has been deactivated"));
    }

    let paid = apply_payment(transaction.total_amount, transaction.amount_paid, payment.amount)?;
    let status = derive_status(transaction.total_amount, paid);

    let record = sqlx::query_as::<_, PaymentRecord>(
        r#"
        INSERT INTO payment_records (transaction_id, amount_paid, payment_method, receipt_number,
                                     recorded_by, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(transaction_id)
    .bind(payment.amount)
    .bind(payment.payment_method)
    .bind(payment.receipt_number.trim())
    .bind(payment.recorded_by)
    .bind(payment.notes)
    .fetch_one(&mut *tx)
    .await?;

    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        UPDATE transactions
        SET amount_paid = $2, status = $3, payment_method = $4, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(transaction_id)
    .bind(paid)
    .bind(status)
    .bind(payment.payment_method)
    .fetch_one(&mut *tx)
    .await?;

    if let Billable::Booking(booking_id) = transaction.billable {
        mirror_booking_status(&mut *tx, booking_id, status).await?;
    }

    tx.commit().await?;
    log::info!(
        "payment {} of {} recorded on {} ({:?})",
        record.receipt_number,
        record.amount_paid,
        row.reference_number,
        status
    );
    Ok((row.into(), record))
}

async fn mirror_booking_status(
    conn: &mut PgConnection,
    booking_id: i64,
    status: PaymentStatus,
) -> Result<()> {
    sqlx::query("UPDATE bookings SET payment_status = $2, updated_at = NOW() WHERE id = $1")
        .bind(booking_id)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(())
}

/// Resets the total of a booking's live payment transaction after its price
/// changed. A price that drops below what was already collected leaves the
/// transaction refunded instead of failing the booking update.
pub async fn retotal_booking_transaction(
    conn: &mut PgConnection,
    booking_id: i64,
    total: Decimal,
) -> Result<()> {
    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        SELECT * FROM transactions
        WHERE billable_kind = 'booking' AND billable_id = $1
          AND transaction_type = 'booking_payment' AND is_active
        ORDER BY id
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(booking_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(());
    };
    let (settled_total, status) = retotal(total, row.amount_paid)?;
    if status == PaymentStatus::Refunded {
        log::info!(
            "{} owes back {} after booking {} was repriced",
            row.reference_number,
            row.amount_paid - total,
            booking_id
        );
    }

    sqlx::query(
        "UPDATE transactions SET total_amount = $2, status = $3, updated_at = NOW() WHERE id = $1",
    )
    .bind(row.id)
    .bind(settled_total)
    .bind(status)
    .execute(&mut *conn)
    .await?;

    mirror_booking_status(conn, booking_id, status).await
}

pub async fn deactivate(db: &Database, id: i64, actor: Uuid, reason: &str) -> Result<Transaction> {
    let row = sqlx::query_as::<_, TransactionRow>(
        r#"
        UPDATE transactions
        SET is_active = FALSE, deactivated_at = NOW(), deactivated_by = $2,
            deactivation_reason = $3, updated_at = NOW()
        WHERE id = $1 AND is_active
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(actor)
    .bind(reason)
    .fetch_optional(db)
    .await?;

    match row {
        Some(row) => {
            log::info!("transaction {} deactivated by {}: {}", row.reference_number, actor, reason);
            Ok(row.into())
        }
        None => {
            let existing = get_transaction(db, id).await?;
            Err(AppError::field(
                "transaction",
                format!("{} is already deactivated", existing.reference_number),
            ))
        }
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    transaction_type: TransactionType,
    billable_kind: BillableKind,
    total_amount: Decimal,
    amount_paid: Decimal,
    service_price: Option<Decimal>,
    parts_cost: Option<Decimal>,
}

/// UTC bounds of a calendar day in the shop's local time.
pub fn day_bounds(date: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = offset
        .from_local_datetime(&date.and_time(chrono::NaiveTime::MIN))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN)));
    (start, start + chrono::Duration::days(1))
}

/// Recomputes and overwrites the summary row for `date`.
pub async fn recompute_summary(
    db: &Database,
    date: NaiveDate,
    offset: FixedOffset,
) -> Result<FinancialSummary> {
    let (start, end) = day_bounds(date, offset);
    let rows = sqlx::query_as::<_, SummaryRow>(
        r#"
        SELECT t.transaction_type, t.billable_kind, t.total_amount, t.amount_paid,
               d.price AS service_price, b.total_parts_cost AS parts_cost
        FROM transactions t
        LEFT JOIN bookings b ON t.billable_kind = 'booking' AND b.id = t.billable_id
        LEFT JOIN detailed_services d ON d.id = b.detailed_service_id
        WHERE t.is_active AND t.created_at >= $1 AND t.created_at < $2
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await?;

    let entries: Vec<SummaryEntry> = rows
        .into_iter()
        .map(|row| SummaryEntry {
            transaction_type: row.transaction_type,
            billable_kind: row.billable_kind,
            total_amount: row.total_amount,
            amount_paid: row.amount_paid,
            booking_split: row.service_price.zip(row.parts_cost),
        })
        .collect();
    let summary = summarize(date, &entries);

    let stored = sqlx::query_as::<_, FinancialSummary>(
        r#"
        INSERT INTO financial_summaries (date, total_revenue, total_expenses, service_revenue,
                                         parts_revenue, outstanding_payments)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (date) DO UPDATE
        SET total_revenue = EXCLUDED.total_revenue,
            total_expenses = EXCLUDED.total_expenses,
            service_revenue = EXCLUDED.service_revenue,
            parts_revenue = EXCLUDED.parts_revenue,
            outstanding_payments = EXCLUDED.outstanding_payments,
            updated_at = NOW()
        RETURNING date, total_revenue, total_expenses, service_revenue, parts_revenue,
                  outstanding_payments
        "#,
    )
    .bind(summary.date)
    .bind(summary.total_revenue)
    .bind(summary.total_expenses)
    .bind(summary.service_revenue)
    .bind(summary.parts_revenue)
    .bind(summary.outstanding_payments)
    .fetch_one(db)
    .await?;

    log::info!(
        "financial summary for {} recomputed from {} transactions",
        date,
        entries.len()
    );
    Ok(stored)
}

const SUMMARY_COLUMNS: &str = "date, total_revenue, total_expenses, service_revenue, \
                               parts_revenue, outstanding_payments";

pub async fn list_summaries(db: &Database, limit: i64) -> Result<Vec<FinancialSummary>> {
    let summaries = sqlx::query_as::<_, FinancialSummary>(&format!(
        "SELECT {} FROM financial_summaries ORDER BY date DESC LIMIT $1",
        SUMMARY_COLUMNS
    ))
    .bind(limit)
    .fetch_all(db)
    .await?;
    Ok(summaries)
}

pub async fn get_summary(db: &Database, date: NaiveDate) -> Result<FinancialSummary> {
    sqlx::query_as::<_, FinancialSummary>(&format!(
        "SELECT {} FROM financial_summaries WHERE date = $1",
        SUMMARY_COLUMNS
    ))
    .bind(date)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::not_found("financial summary", date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LedgerError;
    use crate::store::{bookings, testing};

    #[test]
    fn day_bounds_follow_the_shop_offset() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        let (start, end) = day_bounds(date, FixedOffset::east_opt(3 * 3600).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 3, 13, 21, 0, 0).unwrap());
        assert_eq!(end - start, chrono::Duration::days(1));
    }

    async fn booked(db: &Database, price: i64) -> i64 {
        let customer = testing::customer(db).await;
        let service = testing::detailed_service(db, price, 60).await;
        let draft = testing::draft(&customer, service, None, testing::at(7, 10));
        let view = bookings::create_booking(db, &testing::rules(), "TST", &draft, None)
            .await
            .unwrap();
        view.booking.id
    }

    async fn pay(db: &Database, transaction_id: i64, amount: i64) -> Result<(Transaction, PaymentRecord)> {
        let receipt = testing::unique();
        record_payment(
            db,
            transaction_id,
            &NewPayment {
                amount: Decimal::from(amount),
                payment_method: PaymentMethod::Mpesa,
                receipt_number: &receipt,
                notes: "",
                recorded_by: None,
            },
        )
        .await
    }

    #[tokio::test]
    async fn payments_mirror_status_onto_the_booking() {
        let Some(db) = testing::database().await else {
            return;
        };
        let booking_id = booked(&db, 1000).await;
        let transaction = testing::booking_transaction(&db, booking_id).await;

        let (partial, _) = pay(&db, transaction.id, 400).await.unwrap();
        assert_eq!(partial.status, PaymentStatus::Partial);
        let booking = bookings::get_booking(&db, booking_id).await.unwrap();
        assert_eq!(booking.booking.payment_status, PaymentStatus::Partial);

        let (paid, _) = pay(&db, transaction.id, 600).await.unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);
        assert_eq!(paid.balance_due(), Decimal::ZERO);
        let booking = bookings::get_booking(&db, booking_id).await.unwrap();
        assert_eq!(booking.booking.payment_status, PaymentStatus::Paid);

        assert!(matches!(
            pay(&db, transaction.id, 1).await,
            Err(AppError::Ledger(LedgerError::Overpayment { .. }))
        ));
        assert_eq!(payments_for(&db, transaction.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn recomputing_a_day_gives_the_same_summary() {
        let Some(db) = testing::database().await else {
            return;
        };
        let booking_id = booked(&db, 1000).await;
        let transaction = testing::booking_transaction(&db, booking_id).await;
        pay(&db, transaction.id, 400).await.unwrap();

        let date = testing::unused_date();
        let utc = FixedOffset::east_opt(0).unwrap();
        let (start, _) = day_bounds(date, utc);
        sqlx::query("UPDATE transactions SET created_at = $2 WHERE id = $1")
            .bind(transaction.id)
            .bind(start + chrono::Duration::hours(12))
            .execute(&db)
            .await
            .unwrap();

        let first = recompute_summary(&db, date, utc).await.unwrap();
        let second = recompute_summary(&db, date, utc).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total_revenue, Decimal::from(400));
        assert_eq!(first.service_revenue, Decimal::from(400));
        assert_eq!(first.outstanding_payments, Decimal::from(600));
        assert_eq!(get_summary(&db, date).await.unwrap(), first);

        deactivate(&db, transaction.id, testing::customer(&db).await.account_id, "entered twice")
            .await
            .unwrap();
        let emptied = recompute_summary(&db, date, utc).await.unwrap();
        assert_eq!(emptied.total_revenue, Decimal::ZERO);
    }
}
