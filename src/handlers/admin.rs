//! Server-rendered console for staff and superusers.

use askama::Template;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_cookies::{Cookie, Cookies};

use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::{CurrentAccount, AUTH_COOKIE};
use crate::models::{
    BookingView, DevicePartView, FinancialSummaryView, StockStatus, Transaction,
};
use crate::state::AppState;
use crate::store::accounts;
use crate::store::bookings::{self, BookingScope};
use crate::store::finances::{self, TransactionFilter};

use super::auth::{authenticate, start_session};
use super::dashboard::{admin_overview, AdminOverview};

const LOGIN_PATH: &str = "/admin/login";

#[derive(Template)]
#[template(path = "admin/login.html")]
struct LoginTemplate {
    error: Option<String>,
    email: String,
}

#[derive(Template)]
#[template(path = "admin/dashboard.html")]
struct DashboardTemplate {
    user_name: String,
    is_superuser: bool,
    overview: AdminOverview,
}

#[derive(Template)]
#[template(path = "admin/bookings.html")]
struct BookingsTemplate {
    user_name: String,
    is_superuser: bool,
    bookings: Vec<BookingRow>,
}

#[derive(Template)]
#[template(path = "admin/transactions.html")]
struct TransactionsTemplate {
    user_name: String,
    is_superuser: bool,
    transactions: Vec<TransactionRow>,
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "admin/inventory.html")]
struct InventoryTemplate {
    user_name: String,
    is_superuser: bool,
    parts: Vec<DevicePartView>,
    low_stock_count: usize,
}

#[derive(Template)]
#[template(path = "admin/summaries.html")]
struct SummariesTemplate {
    user_name: String,
    is_superuser: bool,
    summaries: Vec<FinancialSummaryView>,
    error: Option<String>,
}

struct BookingRow {
    id: i64,
    job_card_number: String,
    customer_id: i64,
    technician: String,
    scheduled_time: String,
    status: String,
    payment_status: String,
    parts_cost: Decimal,
}

impl From<BookingView> for BookingRow {
    fn from(view: BookingView) -> Self {
        let booking = view.booking;
        Self {
            id: booking.id,
            job_card_number: view.job_card_number,
            customer_id: booking.customer_id,
            technician: booking
                .technician_id
                .map(|id| format!("#{}", id))
                .unwrap_or_else(|| "unassigned".to_string()),
            scheduled_time: booking.scheduled_time.format("%Y-%m-%d %H:%M UTC").to_string(),
            status: label(&booking.status),
            payment_status: label(&booking.payment_status),
            parts_cost: booking.total_parts_cost,
        }
    }
}

struct TransactionRow {
    id: i64,
    reference_number: String,
    billable: String,
    transaction_type: String,
    total_amount: Decimal,
    amount_paid: Decimal,
    balance_due: Decimal,
    status: String,
    created_at: String,
}

impl From<Transaction> for TransactionRow {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            reference_number: t.reference_number.clone(),
            billable: format!("{} #{}", label(&t.billable.kind()), t.billable.id()),
            transaction_type: label(&t.transaction_type),
            total_amount: t.total_amount,
            amount_paid: t.amount_paid,
            balance_due: t.balance_due(),
            status: label(&t.status),
            created_at: t.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// The snake_case wire name of a serialisable enum.
fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s.replace('_', " "),
        _ => String::new(),
    }
}

fn render<T: Template>(template: T) -> Result<Response> {
    let html = template
        .render()
        .map_err(|e| AppError::Internal(format!("template error: {}", e)))?;
    Ok(Html(html).into_response())
}

/// Console pages are for staff and superusers only; anyone else goes to the login form.
fn console_user(current: Option<CurrentAccount>) -> Option<CurrentAccount> {
    current.filter(|c| c.role.is_staff_side())
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct DeactivateForm {
    reason: String,
}

#[derive(Deserialize)]
pub struct RecomputeForm {
    date: NaiveDate,
}

pub async fn login_page() -> Result<Response> {
    render(LoginTemplate {
        error: None,
        email: String::new(),
    })
}

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    let failed = |message: &str| {
        render(LoginTemplate {
            error: Some(message.to_string()),
            email: form.email.clone(),
        })
    };

    let account = match authenticate(&state, form.email.trim(), &form.password).await {
        Ok(account) => account,
        Err(AppError::InvalidCredential(_)) => return failed("Invalid email or password"),
        Err(e) => return Err(e),
    };
    let staff_side = accounts::load_role(&state.db, &account)
        .await?
        .is_some_and(|role| role.is_staff_side());
    if !staff_side {
        return failed("The console is limited to staff accounts");
    }

    start_session(&state, &cookies, &account).await?;
    log::info!("{} signed in to the console", account.email);
    Ok(Redirect::to("/admin").into_response())
}

pub async fn logout(cookies: Cookies) -> Redirect {
    cookies.remove(Cookie::build(AUTH_COOKIE).path("/").build());
    Redirect::to(LOGIN_PATH)
}

pub async fn dashboard(
    State(state): State<AppState>,
    current: Option<CurrentAccount>,
) -> Result<Response> {
    let Some(current) = console_user(current) else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };
    render(DashboardTemplate {
        user_name: current.display_name(),
        is_superuser: current.role.is_admin(),
        overview: admin_overview(&state.db).await?,
    })
}

pub async fn bookings(
    State(state): State<AppState>,
    current: Option<CurrentAccount>,
) -> Result<Response> {
    let Some(current) = console_user(current) else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };
    let views = bookings::list_bookings(&state.db, BookingScope::default()).await?;
    render(BookingsTemplate {
        user_name: current.display_name(),
        is_superuser: current.role.is_admin(),
        bookings: views.into_iter().map(BookingRow::from).collect(),
    })
}

async fn transactions_page(
    state: &AppState,
    current: &CurrentAccount,
    error: Option<String>,
) -> Result<Response> {
    let transactions = finances::list_transactions(&state.db, &TransactionFilter::default()).await?;
    render(TransactionsTemplate {
        user_name: current.display_name(),
        is_superuser: current.role.is_admin(),
        transactions: transactions.into_iter().map(TransactionRow::from).collect(),
        error,
    })
}

pub async fn transactions(
    State(state): State<AppState>,
    current: Option<CurrentAccount>,
) -> Result<Response> {
    let Some(current) = console_user(current) else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };
    transactions_page(&state, &current, None).await
}

pub async fn deactivate_transaction(
    State(state): State<AppState>,
    current: Option<CurrentAccount>,
    Path(id): Path<i64>,
    Form(form): Form<DeactivateForm>,
) -> Result<Response> {
    let Some(current) = console_user(current) else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };
    let reason = form.reason.trim();
    if reason.is_empty() {
        return transactions_page(&state, &current, Some("A reason is required".to_string())).await;
    }
    match finances::deactivate(&state.db, id, current.account.id, reason).await {
        Ok(_) => Ok(Redirect::to("/admin/transactions").into_response()),
        Err(AppError::Validation(_)) => {
            transactions_page(&state, &current, Some("Transaction is already deactivated".to_string()))
                .await
        }
        Err(e) => Err(e),
    }
}

pub async fn inventory(
    State(state): State<AppState>,
    current: Option<CurrentAccount>,
) -> Result<Response> {
    let Some(current) = console_user(current) else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };
    let parts = sqlx::query_as::<_, crate::models::DevicePart>(
        "SELECT * FROM device_parts ORDER BY device_id NULLS FIRST, name",
    )
    .fetch_all(&state.db)
    .await?;
    let parts: Vec<DevicePartView> = parts.into_iter().map(DevicePartView::from).collect();
    let low_stock_count = parts
        .iter()
        .filter(|p| matches!(p.stock_status, StockStatus::LowStock | StockStatus::OutOfStock))
        .count();

    render(InventoryTemplate {
        user_name: current.display_name(),
        is_superuser: current.role.is_admin(),
        parts,
        low_stock_count,
    })
}

async fn summaries_page(
    state: &AppState,
    current: &CurrentAccount,
    error: Option<String>,
) -> Result<Response> {
    let summaries = finances::list_summaries(&state.db, 30).await?;
    render(SummariesTemplate {
        user_name: current.display_name(),
        is_superuser: current.role.is_admin(),
        summaries: summaries.into_iter().map(FinancialSummaryView::from).collect(),
        error,
    })
}

pub async fn summaries(
    State(state): State<AppState>,
    current: Option<CurrentAccount>,
) -> Result<Response> {
    let Some(current) = console_user(current) else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };
    summaries_page(&state, &current, None).await
}

pub async fn recompute_summary(
    State(state): State<AppState>,
    current: Option<CurrentAccount>,
    Form(form): Form<RecomputeForm>,
) -> Result<Response> {
    let Some(current) = console_user(current) else {
        return Ok(Redirect::to(LOGIN_PATH).into_response());
    };
    if let Err(e) = finances::recompute_summary(&state.db, form.date, state.config.shop_offset).await {
        log::warn!("{} could not recompute {}: {}", current.account.email, form.date, e);
        return summaries_page(&state, &current, Some(e.to_string())).await;
    }
    Ok(Redirect::to("/admin/summaries").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, PaymentStatus};

    #[test]
    fn enum_labels_use_wire_names() {
        assert_eq!(label(&BookingStatus::InProgress), "in progress");
        assert_eq!(label(&PaymentStatus::Partial), "partial");
    }

    #[test]
    fn login_page_renders_error() {
        let html = LoginTemplate {
            error: Some("Invalid email or password".to_string()),
            email: "desk@repairs.test".to_string(),
        }
        .render()
        .unwrap();
        assert!(html.contains("Invalid email or password"));
        assert!(html.contains("desk@repairs.test"));
    }
}
