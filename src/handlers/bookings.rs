use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::middleware::CurrentAccount;
use crate::models::{BookingStatus, BookingView};
use crate::state::AppState;
use crate::store::bookings::{self, BookingDraft, BookingPatch, BookingScope};

#[derive(Debug, Default, Deserialize)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    pub technician_id: Option<i64>,
    pub customer_id: Option<i64>,
}

/// What a customer may change on their own booking: reschedule, add notes or cancel.
fn check_customer_patch(patch: &BookingPatch) -> Result<()> {
    let staff_fields = patch.technician_id.is_some()
        || patch.unassign_technician
        || patch.detailed_service_id.is_some()
        || patch.diagnosis.is_some()
        || patch.parts.is_some();
    if staff_fields {
        return Err(AppError::Forbidden(
            "only staff can change the technician, service, diagnosis or parts",
        ));
    }
    match patch.status {
        None | Some(BookingStatus::Cancelled) => Ok(()),
        Some(_) => Err(AppError::Forbidden("customers can only cancel a booking")),
    }
}

fn scope_for(current: &CurrentAccount, query: &BookingQuery) -> BookingScope {
    match current.customer_id() {
        Some(own) => BookingScope {
            customer_id: Some(own),
            technician_id: None,
            status: query.status,
        },
        None => BookingScope {
            customer_id: query.customer_id,
            technician_id: query.technician_id,
            status: query.status,
        },
    }
}

async fn visible_booking(state: &AppState, current: &CurrentAccount, id: i64) -> Result<BookingView> {
    let view = bookings::get_booking(&state.db, id).await?;
    match current.customer_id() {
        Some(own) if view.booking.customer_id != own => Err(AppError::not_found("booking", id)),
        _ => Ok(view),
    }
}

pub async fn create_booking(
    State(state): State<AppState>,
    current: CurrentAccount,
    Json(mut draft): Json<BookingDraft>,
) -> Result<(StatusCode, Json<BookingView>)> {
    if let Some(own) = current.customer_id() {
        draft.customer_id = own;
        if draft.status != BookingStatus::Pending {
            return Err(AppError::Forbidden("customers can only request pending bookings"));
        }
    }

    let view = bookings::create_booking(
        &state.db,
        &state.schedule_rules(),
        &state.config.reference_prefix,
        &draft,
        Some(current.account.id),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_bookings(
    State(state): State<AppState>,
    current: CurrentAccount,
    Query(query): Query<BookingQuery>,
) -> Result<Json<Vec<BookingView>>> {
    let views = bookings::list_bookings(&state.db, scope_for(&current, &query)).await?;
    Ok(Json(views))
}

pub async fn get_booking(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
) -> Result<Json<BookingView>> {
    Ok(Json(visible_booking(&state, &current, id).await?))
}

pub async fn update_booking(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<i64>,
    Json(patch): Json<BookingPatch>,
) -> Result<Json<BookingView>> {
    if current.customer_id().is_some() {
        check_customer_patch(&patch)?;
        visible_booking(&state, &current, id).await?;
    }
    let view = bookings::update_booking(
        &state.db,
        &state.schedule_rules(),
        id,
        &patch,
        Some(current.account.id),
    )
    .await?;
    Ok(Json(view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PartRequest;

    #[test]
    fn customers_may_cancel_or_reschedule() {
        let cancel = BookingPatch {
            status: Some(BookingStatus::Cancelled),
            ..Default::default()
        };
        assert!(check_customer_patch(&cancel).is_ok());

        let notes = BookingPatch {
            notes: Some("Please call first".to_string()),
            ..Default::default()
        };
        assert!(check_customer_patch(&notes).is_ok());
    }

    #[test]
    fn customers_cannot_drive_the_workflow() {
        let confirm = BookingPatch {
            status: Some(BookingStatus::Confirmed),
            ..Default::default()
        };
        assert!(matches!(check_customer_patch(&confirm), Err(AppError::Forbidden(_))));

        let parts = BookingPatch {
            parts: Some(vec![PartRequest { part_id: 1, quantity: 1 }]),
            ..Default::default()
        };
        assert!(matches!(check_customer_patch(&parts), Err(AppError::Forbidden(_))));
    }
}
