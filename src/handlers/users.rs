use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::CurrentAccount;
use crate::models::AccountResponse;
use crate::state::AppState;
use crate::store::accounts::{self, AccountPatch};
use crate::validation::validate_phone;

pub async fn list_users(
    State(state): State<AppState>,
    current: CurrentAccount,
) -> Result<Json<Vec<AccountResponse>>> {
    let users = accounts::list_visible(&state.db, &current.account, &current.role).await?;
    Ok(Json(users.into_iter().map(AccountResponse::from).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    if !accounts::can_view(&state.db, &current.account, &current.role, id).await? {
        return Err(AppError::not_found("account", id));
    }
    let account = accounts::find_by_id(&state.db, id).await?;
    let role = accounts::load_role(&state.db, &account).await?;
    Ok(Json(json!({
        "user": AccountResponse::from(account),
        "role": role.as_ref().map(|r| r.name()),
        "profile": role.as_ref().map(|r| r.profile_json()),
    })))
}

pub async fn update_user(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<Uuid>,
    Json(patch): Json<AccountPatch>,
) -> Result<Json<AccountResponse>> {
    if current.account.id != id && !current.role.is_admin() {
        return Err(AppError::Forbidden("you can only update your own account"));
    }
    if let Some(phone) = patch.phone_number.as_deref() {
        validate_phone(phone).map_err(|m| AppError::field("phone_number", m))?;
    }
    let account = accounts::update_account(&state.db, id, &patch).await?;
    Ok(Json(account.into()))
}

pub async fn toggle_active(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<Uuid>,
) -> Result<Json<AccountResponse>> {
    current.require_admin()?;
    if current.account.id == id {
        return Err(AppError::field("id", "you cannot deactivate your own account"));
    }
    let account = accounts::toggle_active(&state.db, id).await?;
    log::info!(
        "{} set {} active={}",
        current.account.email,
        account.email,
        account.is_active
    );
    Ok(Json(account.into()))
}
