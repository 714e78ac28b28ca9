use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    BookingPayment,
    PartsPurchase,
    ServicePayment,
    StaffSalary,
}

impl TransactionType {
    pub fn is_revenue(self) -> bool {
        matches!(
            self,
            TransactionType::BookingPayment | TransactionType::ServicePayment
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Mpesa,
    BankTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "billable_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillableKind {
    Booking,
    DevicePart,
    StaffProfile,
}

/// The entity a transaction bills. The set of billable entities is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Billable {
    Booking(i64),
    DevicePart(i64),
    StaffProfile(i64),
}

impl Billable {
    pub fn from_parts(kind: BillableKind, id: i64) -> Self {
        match kind {
            BillableKind::Booking => Billable::Booking(id),
            BillableKind::DevicePart => Billable::DevicePart(id),
            BillableKind::StaffProfile => Billable::StaffProfile(id),
        }
    }

    pub fn kind(self) -> BillableKind {
        match self {
            Billable::Booking(_) => BillableKind::Booking,
            Billable::DevicePart(_) => BillableKind::DevicePart,
            Billable::StaffProfile(_) => BillableKind::StaffProfile,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Billable::Booking(id) | Billable::DevicePart(id) | Billable::StaffProfile(id) => id,
        }
    }

    pub fn allows(self, transaction_type: TransactionType) -> bool {
        use TransactionType::*;
        match self {
            Billable::Booking(_) => matches!(transaction_type, BookingPayment | ServicePayment),
            Billable::DevicePart(_) => matches!(transaction_type, PartsPurchase | ServicePayment),
            Billable::StaffProfile(_) => matches!(transaction_type, StaffSalary),
        }
    }
}

/// Whether a transaction is live or has been soft-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Deactivated {
        at: DateTime<Utc>,
        by: Option<Uuid>,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    InvalidAmount(&'static str),

    #[error("payment of {amount} would exceed the total amount due; remaining balance {remaining}")]
    Overpayment { amount: Decimal, remaining: Decimal },
}

/// Checks the amounts a transaction is created with.
pub fn validate_amounts(total_amount: Decimal, amount_paid: Decimal) -> Result<(), LedgerError> {
    if total_amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount("total amount must be greater than zero"));
    }
    if amount_paid < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount("amount paid cannot be negative"));
    }
    if amount_paid > total_amount {
        return Err(LedgerError::InvalidAmount("amount paid cannot exceed total amount"));
    }
    Ok(())
}

/// New cumulative paid amount after applying `amount` on top of `already_paid`.
pub fn apply_payment(
    total_amount: Decimal,
    already_paid: Decimal,
    amount: Decimal,
) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount("payment amount must be greater than zero"));
    }
    let paid = already_paid + amount;
    if paid > total_amount {
        return Err(LedgerError::Overpayment {
            amount,
            remaining: total_amount - already_paid,
        });
    }
    Ok(paid)
}

/// Status as a pure function of the two amounts.
pub fn derive_status(total_amount: Decimal, amount_paid: Decimal) -> PaymentStatus {
    if amount_paid <= Decimal::ZERO {
        PaymentStatus::Pending
    } else if amount_paid < total_amount {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Paid
    }
}

/// Total and status of a billed transaction after the price of what it bills changed.
///
/// When more has been collected than the new price, the total is pinned to the
/// amount paid and the transaction is marked refunded: the difference is owed back
/// to the customer and no further payment can be taken.
pub fn retotal(new_total: Decimal, amount_paid: Decimal) -> Result<(Decimal, PaymentStatus), LedgerError> {
    if amount_paid > new_total && amount_paid > Decimal::ZERO {
        return Ok((amount_paid, PaymentStatus::Refunded));
    }
    validate_amounts(new_total, amount_paid)?;
    Ok((new_total, derive_status(new_total, amount_paid)))
}

pub fn balance_due(total_amount: Decimal, amount_paid: Decimal) -> Decimal {
    total_amount - amount_paid
}

pub fn payment_progress(total_amount: Decimal, amount_paid: Decimal) -> Decimal {
    if total_amount.is_zero() {
        return Decimal::ZERO;
    }
    (amount_paid / total_amount * Decimal::ONE_HUNDRED).round_dp(2)
}

pub fn format_reference(prefix: &str, sequence: i64) -> String {
    format!("{}{:06}", prefix, sequence)
}

/// Row shape of the `transactions` table.
#[derive(Debug, Clone, FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub reference_number: String,
    pub billable_kind: BillableKind,
    pub billable_id: i64,
    pub transaction_type: TransactionType,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub notes: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub deactivated_by: Option<Uuid>,
    pub deactivation_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub reference_number: String,
    pub billable: Billable,
    pub transaction_type: TransactionType,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub notes: String,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub lifecycle: Lifecycle,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        let lifecycle = match (row.is_active, row.deactivated_at) {
            (false, Some(at)) => Lifecycle::Deactivated {
                at,
                by: row.deactivated_by,
                reason: row.deactivation_reason,
            },
            (false, None) => Lifecycle::Deactivated {
                at: row.updated_at,
                by: row.deactivated_by,
                reason: row.deactivation_reason,
            },
            (true, _) => Lifecycle::Active,
        };
        Self {
            id: row.id,
            reference_number: row.reference_number,
            billable: Billable::from_parts(row.billable_kind, row.billable_id),
            transaction_type: row.transaction_type,
            total_amount: row.total_amount,
            amount_paid: row.amount_paid,
            status: row.status,
            payment_method: row.payment_method,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            lifecycle,
        }
    }
}

impl Transaction {
    pub fn balance_due(&self) -> Decimal {
        balance_due(self.total_amount, self.amount_paid)
    }

    pub fn payment_progress(&self) -> Decimal {
        payment_progress(self.total_amount, self.amount_paid)
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub balance_due: Decimal,
    pub payment_progress: Decimal,
    pub payments: Vec<PaymentRecord>,
}

impl TransactionView {
    pub fn new(transaction: Transaction, payments: Vec<PaymentRecord>) -> Self {
        Self {
            balance_due: transaction.balance_due(),
            payment_progress: transaction.payment_progress(),
            transaction,
            payments,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentRecord {
    pub id: i64,
    pub transaction_id: i64,
    pub amount_paid: Decimal,
    pub payment_date: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub receipt_number: String,
    pub recorded_by: Option<Uuid>,
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FinancialSummary {
    pub date: NaiveDate,
    pub total_revenue: Decimal,
    pub total_expenses: Decimal,
    pub service_revenue: Decimal,
    pub parts_revenue: Decimal,
    pub outstanding_payments: Decimal,
}

impl FinancialSummary {
    pub fn net_revenue(&self) -> Decimal {
        self.total_revenue - self.total_expenses
    }

    pub fn profit_margin(&self) -> Decimal {
        if self.total_revenue.is_zero() {
            return Decimal::ZERO;
        }
        (self.net_revenue() / self.total_revenue * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

#[derive(Debug, Serialize)]
pub struct FinancialSummaryView {
    #[serde(flatten)]
    pub summary: FinancialSummary,
    pub net_revenue: Decimal,
    pub profit_margin: Decimal,
}

impl From<FinancialSummary> for FinancialSummaryView {
    fn from(summary: FinancialSummary) -> Self {
        Self {
            net_revenue: summary.net_revenue(),
            profit_margin: summary.profit_margin(),
            summary,
        }
    }
}

/// One active transaction of the day being summarised. `booking_split` carries the
/// linked booking's service price and parts cost when the transaction bills a booking.
#[derive(Debug, Clone)]
pub struct SummaryEntry {
    pub transaction_type: TransactionType,
    pub billable_kind: BillableKind,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub booking_split: Option<(Decimal, Decimal)>,
}

/// Aggregates a day's transactions. The result depends only on the entries, so
/// recomputing a date always yields the same row.
///
/// Booking payments are split between service and parts in proportion to the
/// booking's service price and parts cost; the service share absorbs rounding.
pub fn summarize(date: NaiveDate, entries: &[SummaryEntry]) -> FinancialSummary {
    let mut summary = FinancialSummary {
        date,
        total_revenue: Decimal::ZERO,
        total_expenses: Decimal::ZERO,
        service_revenue: Decimal::ZERO,
        parts_revenue: Decimal::ZERO,
        outstanding_payments: Decimal::ZERO,
    };

    for entry in entries {
        if !entry.transaction_type.is_revenue() {
            summary.total_expenses += entry.amount_paid;
            continue;
        }

        summary.total_revenue += entry.amount_paid;
        summary.outstanding_payments += balance_due(entry.total_amount, entry.amount_paid);

        match (entry.billable_kind, entry.booking_split) {
            (BillableKind::Booking, Some((service_price, parts_cost))) => {
                let billed = service_price + parts_cost;
                let parts_share = if billed.is_zero() {
                    Decimal::ZERO
                } else {
                    (entry.amount_paid * parts_cost / billed).round_dp(2)
                };
                summary.parts_revenue += parts_share;
                summary.service_revenue += entry.amount_paid - parts_share;
            }
            (BillableKind::DevicePart, _) => summary.parts_revenue += entry.amount_paid,
            _ => summary.service_revenue += entry.amount_paid,
        }
    }

    summary
}
