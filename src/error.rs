//! Error taxonomy shared by every handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::identity::IdentityError;
use crate::models::{LedgerError, StockError};
use crate::scheduling::ScheduleViolation;
use crate::validation::FieldErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    InvalidSchedule(#[from] ScheduleViolation),

    #[error("{0}")]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Stock(#[from] StockError),

    #[error("part {part_id} belongs to device {part_device}, not the booking's device")]
    PartDeviceMismatch { part_id: i64, part_device: i64 },

    #[error("authentication credentials were not provided")]
    Unauthenticated,

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("no active account matches this credential")]
    UnknownAccount,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("request was throttled, try again later")]
    Throttled,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{field} already exists")]
    Conflict { field: String },

    #[error("identity provider error: {0}")]
    ExternalIdentity(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation(FieldErrors::single(field, message))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidSchedule(_)
            | AppError::Ledger(_)
            | AppError::Stock(_)
            | AppError::PartDeviceMismatch { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::InvalidCredential(_) | AppError::UnknownAccount => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Throttled => StatusCode::TOO_MANY_REQUESTS,
            AppError::ExternalIdentity(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Migration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::InvalidSchedule(_) => "invalid_schedule",
            AppError::Ledger(LedgerError::Overpayment { .. }) => "overpayment",
            AppError::Ledger(LedgerError::InvalidAmount(_)) => "invalid_amount",
            AppError::Stock(StockError::Insufficient { .. }) => "insufficient_stock",
            AppError::Stock(StockError::NonPositive | StockError::TooLarge { .. }) => {
                "validation_error"
            }
            AppError::PartDeviceMismatch { .. } => "part_device_mismatch",
            AppError::Unauthenticated => "unauthenticated",
            AppError::InvalidCredential(_) => "invalid_credential",
            AppError::UnknownAccount => "unknown_account",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound { .. } => "not_found",
            AppError::Conflict { .. } => "conflict",
            AppError::Throttled => "throttled",
            AppError::ExternalIdentity(_) => "external_identity_error",
            AppError::Database(_) | AppError::Migration(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

/// Field a unique constraint protects, by constraint name.
fn conflict_field(constraint: Option<&str>) -> &'static str {
    match constraint.unwrap_or_default() {
        "accounts_email_key" => "email",
        "accounts_external_subject_key" => "external_subject",
        "devices_serial_number_key" | "device_parts_serial_number_key" => "serial_number",
        "service_categories_name_key" | "services_category_name_key" => "name",
        "detailed_services_service_device_key" => "device_type",
        "service_parts_required_detailed_service_id_part_id_key" => "part_id",
        "transactions_reference_number_key" => "reference_number",
        "payment_records_receipt_number_key" => "receipt_number",
        "customer_profiles_login_token_key" | "staff_profiles_login_token_key" => "login_token",
        "customer_profiles_account_id_key" | "staff_profiles_account_id_key" => "profile",
        "financial_summaries_date_key" => "date",
        _ => "record",
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::RowNotFound = err {
            return AppError::NotFound {
                entity: "record",
                id: String::new(),
            };
        }
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return AppError::Conflict {
                    field: conflict_field(db_err.constraint()).to_string(),
                };
            }
            if db_err.is_foreign_key_violation() {
                return AppError::field("reference", "referenced record does not exist");
            }
            if db_err.is_check_violation() {
                return AppError::field(
                    db_err.constraint().unwrap_or("record"),
                    "value violates a data constraint",
                );
            }
        }
        AppError::Database(err)
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidToken(reason) => AppError::InvalidCredential(reason),
            IdentityError::Revoked => AppError::InvalidCredential("token has been revoked".into()),
            IdentityError::EmailExists => AppError::Conflict {
                field: "email".to_string(),
            },
            IdentityError::Unsupported(op) => AppError::Forbidden(op),
            IdentityError::Upstream(msg) => AppError::ExternalIdentity(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{} ({})", self, status);
        }

        let mut error = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        match &self {
            AppError::Validation(fields) => error["fields"] = json!(fields),
            AppError::InvalidSchedule(violation) => error["reason"] = json!(violation.reason()),
            AppError::Conflict { field } => {
                error["fields"] = json!({ (field.as_str()): ["already exists"] })
            }
            _ => {}
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn schedule_errors_carry_reason() {
        let (status, json) = body(ScheduleViolation::SlotConflict { booking_id: 3 }.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "invalid_schedule");
        assert_eq!(json["error"]["reason"], "slot_conflict");
    }

    #[tokio::test]
    async fn validation_errors_list_fields() {
        let (status, json) = body(AppError::field("password", "too short")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["fields"]["password"][0], "too short");
    }

    #[tokio::test]
    async fn overpayment_is_a_bad_request() {
        let err = AppError::from(LedgerError::Overpayment {
            amount: rust_decimal::Decimal::ONE,
            remaining: rust_decimal::Decimal::ZERO,
        });
        let (status, json) = body(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "overpayment");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Throttled.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(AppError::UnknownAccount.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden("staff only").status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("booking", 4).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::ExternalIdentity("timeout".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(conflict_field(Some("payment_records_receipt_number_key")), "receipt_number");
    }
}
