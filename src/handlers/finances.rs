use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::middleware::CurrentAccount;
use crate::models::{
    Billable, BillableKind, FinancialSummaryView, PaymentMethod, Transaction, TransactionType,
    TransactionView,
};
use crate::state::AppState;
use crate::store::finances::{self, NewPayment, NewTransaction, TransactionFilter};

#[derive(Debug, Deserialize)]
pub struct TransactionForm {
    pub billable_kind: BillableKind,
    pub billable_id: i64,
    pub transaction_type: TransactionType,
    pub total_amount: Decimal,
    #[serde(default)]
    pub amount_paid: Decimal,
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    pub include_inactive: bool,
    pub billable_kind: Option<BillableKind>,
    pub billable_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentForm {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub receipt_number: String,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct DeactivateForm {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    30
}

async fn visible_transaction(
    state: &AppState,
    current: &CurrentAccount,
    id: i64,
) -> Result<Transaction> {
    let transaction = finances::get_transaction(&state.db, id).await?;
    if !transaction.is_active() && !current.role.is_admin() {
        return Err(AppError::not_found("transaction", id));
    }
    if let Some(own) = current.customer_id() {
        let owned = match transaction.billable {
            Billable::Booking(booking_id) => {
                let customer: Option<i64> =
                    sqlx::query_scalar("SELECT customer_id FROM bookings WHERE id = $1")
                        .bind(booking_id)
                        .fetch_optional(&state.db)
                        .await?;
                customer == Some(own)
            }
            _ => false,
        };
        if !owned {
            return Err(AppError::not_found("transaction", id));
        }
    }
    Ok(transaction)
}

pub async fn create_transaction(
    State(state): State<AppState>,
    current: CurrentAccount,
    Json(form): Json<TransactionForm>,
) -> Result<(StatusCode, Json<TransactionView>)> {
    current.require_staff()?;

    let mut conn = state.db.acquire().await?;
    let transaction = finances::insert_transaction(
        &mut *conn,
        &state.config.reference_prefix,
        &NewTransaction {
            billable: Billable::from_parts(form.billable_kind, form.billable_id),
            transaction_type: form.transaction_type,
            total_amount: form.total_amount,
            amount_paid: form.amount_paid,
            payment_method: form.payment_method,
            notes: &form.notes,
            created_by: Some(current.account.id),
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(TransactionView::new(transaction, Vec::new()))))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    current: CurrentAccount,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<TransactionView>>> {
    if query.include_inactive {
        current.require_admin()?;
    }
    let billable = query
        .billable_kind
        .zip(query.billable_id)
        .map(|(kind, id)| Billable::from_parts(kind, id));
    let filter = TransactionFilter {
        include_inactive: query.include_inactive,
        billable,
        customer_id: current.customer_id(),
    };

    let transactions = finances::list_transactions(&state.db, &filter).await?;
    let views = transactions
        .into_iter()
        .map(|t| TransactionView::new(t, Vec::new()))
        .collect();
    Ok(Json(views))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<TransactionView>> {
    let transaction = visible_transaction(&state, &current, id).await?;
    let payments = finances::payments_for(&state.db, id).await?;
    Ok(Json(TransactionView::new(transaction, payments)))
}

pub async fn record_payment(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
    Json(form): Json<PaymentForm>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    current.require_staff()?;
    if form.receipt_number.trim().is_empty() {
        return Err(AppError::field("receipt_number", "this field is required"));
    }

    let (transaction, payment) = finances::record_payment(
        &state.db,
        id,
        &NewPayment {
            amount: form.amount,
            payment_method: form.payment_method,
            receipt_number: &form.receipt_number,
            notes: &form.notes,
            recorded_by: Some(current.account.id),
        },
    )
    .await?;

    let payments = finances::payments_for(&state.db, id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "payment": payment,
            "transaction": TransactionView::new(transaction, payments),
        })),
    ))
}

pub async fn deactivate_transaction(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
    Json(form): Json<DeactivateForm>,
) -> Result<Json<TransactionView>> {
    current.require_staff()?;
    if form.reason.trim().is_empty() {
        return Err(AppError::field("reason", "a reason is required"));
    }
    let transaction = finances::deactivate(&state.db, id, current.account.id, form.reason.trim()).await?;
    let payments = finances::payments_for(&state.db, id).await?;
    Ok(Json(TransactionView::new(transaction, payments)))
}

pub async fn recompute_summary(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(date): Path<NaiveDate>,
) -> Result<Json<FinancialSummaryView>> {
    current.require_staff()?;
    let summary = finances::recompute_summary(&state.db, date, state.config.shop_offset).await?;
    Ok(Json(summary.into()))
}

pub async fn list_summaries(
    State(state): State<AppState>,
    current: CurrentAccount,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<Vec<FinancialSummaryView>>> {
    current.require_staff()?;
    let limit = query.limit.clamp(1, 366);
    let summaries = finances::list_summaries(&state.db, limit).await?;
    Ok(Json(summaries.into_iter().map(FinancialSummaryView::from).collect()))
}

pub async fn get_summary(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(date): Path<NaiveDate>,
) -> Result<Json<FinancialSummaryView>> {
    current.require_staff()?;
    Ok(Json(finances::get_summary(&state.db, date).await?.into()))
}
