//! Role-specific dashboard payloads for `GET /user/me` and the admin console.

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;

use crate::database::Database;
use crate::error::Result;
use crate::models::{
    Booking, DevicePart, DevicePartView, FinancialSummary, FinancialSummaryView, Role,
    Transaction, TransactionRow,
};
use crate::state::AppState;
use crate::store::{finances, inventory};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct AdminOverview {
    pub bookings_last_30_days: i64,
    pub status_breakdown: Vec<StatusCount>,
    pub recent_bookings: Vec<Booking>,
    pub low_stock: Vec<DevicePart>,
    pub active_staff: i64,
    pub technicians: i64,
    pub recent_transactions: Vec<Transaction>,
    pub latest_summary: Option<FinancialSummary>,
    pub active_services: i64,
    pub categories: i64,
}

async fn count(db: &Database, sql: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(sql).fetch_one(db).await?;
    Ok(n)
}

pub async fn admin_overview(db: &Database) -> Result<AdminOverview> {
    let since = Utc::now() - Duration::days(30);

    let bookings_last_30_days: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE created_at >= $1")
            .bind(since)
            .fetch_one(db)
            .await?;

    let status_breakdown = sqlx::query_as::<_, StatusCount>(
        r#"
        SELECT status::TEXT AS status, COUNT(*) AS count
        FROM bookings
        WHERE created_at >= $1
        GROUP BY status
        ORDER BY status
        "#,
    )
    .bind(since)
    .fetch_all(db)
    .await?;

    let recent_bookings =
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings ORDER BY created_at DESC LIMIT 5")
            .fetch_all(db)
            .await?;

    let recent_transactions = sqlx::query_as::<_, TransactionRow>(
        "SELECT * FROM transactions WHERE is_active ORDER BY created_at DESC LIMIT 5",
    )
    .fetch_all(db)
    .await?
    .into_iter()
    .map(Transaction::from)
    .collect();

    Ok(AdminOverview {
        bookings_last_30_days,
        status_breakdown,
        recent_bookings,
        low_stock: inventory::low_stock_parts(db).await?,
        active_staff: count(
            db,
            "SELECT COUNT(*) FROM staff_profiles s JOIN accounts a ON a.id = s.account_id WHERE a.is_active",
        )
        .await?,
        technicians: count(
            db,
            "SELECT COUNT(*) FROM staff_profiles s JOIN accounts a ON a.id = s.account_id \
             WHERE a.is_active AND s.role = 'technician'",
        )
        .await?,
        recent_transactions,
        latest_summary: finances::list_summaries(db, 1).await?.into_iter().next(),
        active_services: count(db, "SELECT COUNT(*) FROM services WHERE active").await?,
        categories: count(db, "SELECT COUNT(*) FROM service_categories").await?,
    })
}

pub async fn for_role(state: &AppState, role: &Role) -> Result<serde_json::Value> {
    let db = &state.db;
    let dashboard = match role {
        Role::Admin(_) => {
            let overview = admin_overview(db).await?;
            json!({
                "repairs": {
                    "last_30_days": overview.bookings_last_30_days,
                    "by_status": overview.status_breakdown,
                    "recent": overview.recent_bookings,
                },
                "inventory": {
                    "low_stock": overview.low_stock.into_iter().map(DevicePartView::from).collect::<Vec<_>>(),
                },
                "staff": {
                    "active": overview.active_staff,
                    "technicians": overview.technicians,
                },
                "finances": {
                    "recent_transactions": overview.recent_transactions,
                    "latest_summary": overview.latest_summary.map(FinancialSummaryView::from),
                },
                "services": {
                    "active": overview.active_services,
                    "categories": overview.categories,
                },
            })
        }
        Role::Staff(profile) => {
            let (assigned, pending, completed): (i64, i64, i64) = sqlx::query_as(
                r#"
                SELECT
                    COUNT(*) FILTER (WHERE technician_id = $1
                                     AND status IN ('pending', 'confirmed', 'in_progress')),
                    COUNT(*) FILTER (WHERE status = 'pending'),
                    COUNT(*) FILTER (WHERE technician_id = $1 AND status = 'completed')
                FROM bookings
                "#,
            )
            .bind(profile.id)
            .fetch_one(db)
            .await?;
            json!({
                "assigned_repairs": assigned,
                "pending_repairs": pending,
                "completed_repairs": completed,
            })
        }
        Role::Customer(profile) => {
            let (total, active, completed): (i64, i64, i64) = sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE status IN ('pending', 'confirmed', 'in_progress')),
                    COUNT(*) FILTER (WHERE status = 'completed')
                FROM bookings
                WHERE customer_id = $1
                "#,
            )
            .bind(profile.id)
            .fetch_one(db)
            .await?;
            json!({
                "total_bookings": total,
                "active_bookings": active,
                "completed_bookings": completed,
            })
        }
    };
    Ok(dashboard)
}
