use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::identity::NewIdentity;
use crate::middleware::{CurrentAccount, AUTH_COOKIE};
use crate::models::{
    Account, AccountResponse, ContactMethod, CustomerRole, StaffRole, WeeklyAvailability,
};
use crate::scheduling::BusinessHours;
use crate::state::AppState;
use crate::store::accounts::{self, NewAccount, NewCustomerProfile, NewStaffProfile};
use crate::utils::{hash_password, verify_password};
use crate::validation::{
    normalize_email, validate_availability, validate_email, validate_password, validate_phone,
    validate_specializations, FieldErrors,
};

use super::dashboard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileType {
    Customer,
    Staff,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    pub profile_type: ProfileType,

    // customer
    #[serde(default)]
    pub customer_role: Option<CustomerRole>,
    #[serde(default)]
    pub preferred_contact: Option<ContactMethod>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,

    // staff
    #[serde(default)]
    pub staff_role: Option<StaffRole>,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub availability: WeeklyAvailability,
}

/// Every field problem in a registration request, collected rather than
/// stopping at the first.
pub fn validate_registration(req: &RegisterRequest, hours: BusinessHours) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.check("email", validate_email(&req.email));
    errors.check("password", validate_password(&req.password));
    if req.password != req.confirm_password {
        errors.add("confirm_password", "passwords do not match");
    }
    if let Some(phone) = req.phone_number.as_deref().filter(|p| !p.is_empty()) {
        errors.check("phone_number", validate_phone(phone));
    }

    match req.profile_type {
        ProfileType::Customer => {
            let company_missing = req
                .company_name
                .as_deref()
                .map_or(true, |name| name.trim().is_empty());
            if req.customer_role == Some(CustomerRole::Company) && company_missing {
                errors.add("company_name", "company name is required for company accounts");
            }
        }
        ProfileType::Staff => {
            if req.staff_role.is_none() {
                errors.add("staff_role", "staff role is required");
            }
            if let Err(message) = validate_specializations(&req.specializations) {
                errors.add("specializations", message);
            }
            errors.check("availability", validate_availability(&req.availability, hours));
        }
    }

    errors
}

struct Registered {
    account: Account,
    login_token: Option<String>,
}

/// Local half of registration: account, profile and claims in one transaction.
async fn persist_registration(
    state: &AppState,
    req: &RegisterRequest,
    subject: &str,
    password_hash: &str,
) -> Result<Registered> {
    let mut tx = state.db.begin().await?;
    let account = accounts::insert_account(
        &mut *tx,
        &NewAccount {
            email: &req.email,
            external_subject: subject,
            password_hash,
            first_name: req.first_name.as_deref(),
            last_name: req.last_name.as_deref(),
            phone_number: req.phone_number.as_deref().filter(|p| !p.is_empty()),
            is_staff: req.profile_type == ProfileType::Staff,
        },
    )
    .await?;

    let login_token = match req.profile_type {
        ProfileType::Customer => {
            let profile = NewCustomerProfile {
                role: req.customer_role.unwrap_or(CustomerRole::Individual),
                preferred_contact: req.preferred_contact.unwrap_or_default(),
                company_name: req.company_name.clone().filter(|n| !n.trim().is_empty()),
                address: req.address.clone().unwrap_or_default(),
            };
            accounts::insert_customer_profile(&mut *tx, account.id, &profile)
                .await?
                .login_token
        }
        ProfileType::Staff => {
            let profile = NewStaffProfile {
                role: req.staff_role.unwrap_or(StaffRole::Technician),
                specializations: validate_specializations(&req.specializations)
                    .map_err(|m| AppError::field("specializations", m))?,
                availability: req.availability.clone(),
            };
            accounts::insert_staff_profile(&mut *tx, account.id, &profile)
                .await?
                .login_token
        }
    };

    state
        .identity
        .sync_claims(subject, &accounts::claims_for(&account))
        .await?;
    tx.commit().await?;

    Ok(Registered {
        account,
        login_token,
    })
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    validate_registration(&req, state.config.business_hours).into_result()?;
    if accounts::find_by_email(&state.db, &req.email).await?.is_some() {
        return Err(AppError::Conflict {
            field: "email".to_string(),
        });
    }
    let password_hash =
        hash_password(&req.password).map_err(|e| AppError::Internal(e.to_string()))?;

    let display_name = format!(
        "{} {}",
        req.first_name.as_deref().unwrap_or_default(),
        req.last_name.as_deref().unwrap_or_default()
    );
    let identity = NewIdentity {
        email: normalize_email(&req.email),
        password: req.password.clone(),
        display_name: Some(display_name.trim().to_string()).filter(|n| !n.is_empty()),
    };
    let (state_ref, req_ref, hash) = (&state, &req, password_hash.as_str());
    let registered =
        accounts::with_provider_account(state.identity.as_ref(), &identity, |subject| async move {
            persist_registration(state_ref, req_ref, &subject, hash).await
        })
        .await?;

    log::info!(
        "registered {} as {:?} ({})",
        registered.account.email,
        req.profile_type,
        registered.account.id
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "registration successful",
            "data": {
                "email": registered.account.email,
                "profile_type": req.profile_type,
                "login_token": registered.login_token,
            }
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Checks email and password against the local record. Inactive accounts fail the
/// same way as wrong passwords.
pub async fn authenticate(state: &AppState, email: &str, password: &str) -> Result<Account> {
    let account = accounts::find_by_email(&state.db, email)
        .await?
        .filter(|account| account.is_active)
        .ok_or_else(|| AppError::InvalidCredential("invalid email or password".to_string()))?;

    if !verify_password(password, &account.password_hash) {
        return Err(AppError::InvalidCredential("invalid email or password".to_string()));
    }
    Ok(account)
}

/// Issues a provider token and stores it in the console cookie.
pub async fn start_session(state: &AppState, cookies: &Cookies, account: &Account) -> Result<String> {
    let subject = account
        .external_subject
        .as_deref()
        .ok_or(AppError::UnknownAccount)?;
    let issued = state.identity.issue_token(subject, &account.email).await?;
    accounts::touch_last_login(&state.db, account.id).await?;

    let cookie = Cookie::build((AUTH_COOKIE, issued.token.clone()))
        .path("/")
        .http_only(true)
        .max_age(time::Duration::seconds(issued.expires_in))
        .build();
    cookies.add(cookie);

    Ok(issued.token)
}

pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>> {
    let account = authenticate(&state, &req.email, &req.password).await?;
    let token = start_session(&state, &cookies, &account).await?;

    let role = accounts::load_role(&state.db, &account).await?;
    log::info!("{} logged in", account.email);
    Ok(Json(json!({
        "token": token,
        "role": role.as_ref().map(|r| r.name()),
        "user": AccountResponse::from(account),
    })))
}

pub async fn logout(cookies: Cookies) -> StatusCode {
    cookies.remove(Cookie::build(AUTH_COOKIE).path("/").build());
    StatusCode::NO_CONTENT
}

pub async fn me(
    State(state): State<AppState>,
    current: CurrentAccount,
) -> Result<Json<serde_json::Value>> {
    let dashboard = dashboard::for_role(&state, &current.role).await?;
    Ok(Json(json!({
        "user": AccountResponse::from(current.account.clone()),
        "role": current.role.name(),
        "profile": current.role.profile_json(),
        "dashboard": dashboard,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentAccount,
    Path(id): Path<Uuid>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>> {
    if current.account.id != id && !current.role.is_admin() {
        return Err(AppError::Forbidden("you can only change your own password"));
    }
    let account = accounts::find_by_id(&state.db, id).await?;

    let mut errors = FieldErrors::new();
    if !verify_password(&req.old_password, &account.password_hash) {
        errors.add("old_password", "current password is incorrect");
    }
    if req.old_password == req.new_password {
        errors.add("new_password", "new password must differ from the current one");
    }
    errors.check("new_password", validate_password(&req.new_password));
    errors.into_result()?;

    let password_hash =
        hash_password(&req.new_password).map_err(|e| AppError::Internal(e.to_string()))?;
    if let Some(subject) = &account.external_subject {
        state.identity.update_password(subject, &req.new_password).await?;
    }
    accounts::set_password_hash(&state.db, id, &password_hash).await?;

    log::info!("password changed for {}", account.email);
    Ok(Json(json!({ "message": "password changed" })))
}

pub async fn regenerate_login_token(
    State(state): State<AppState>,
    current: CurrentAccount,
) -> Result<Json<serde_json::Value>> {
    let token = accounts::regenerate_login_token(&state.db, &current.role).await?;
    Ok(Json(json!({ "login_token": token })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    use crate::models::AvailabilityWindow;

    fn hours() -> BusinessHours {
        BusinessHours {
            start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        }
    }

    fn request(profile_type: ProfileType) -> RegisterRequest {
        RegisterRequest {
            email: "jane@example.com".to_string(),
            password: "secret123".to_string(),
            confirm_password: "secret123".to_string(),
            first_name: Some("Jane".to_string()),
            last_name: None,
            phone_number: None,
            profile_type,
            customer_role: None,
            preferred_contact: None,
            company_name: None,
            address: None,
            staff_role: None,
            specializations: Vec::new(),
            availability: WeeklyAvailability::new(),
        }
    }

    #[test]
    fn valid_customer_registration_passes() {
        assert!(validate_registration(&request(ProfileType::Customer), hours()).is_empty());
    }

    #[test]
    fn company_customers_need_a_company_name() {
        let mut req = request(ProfileType::Customer);
        req.customer_role = Some(CustomerRole::Company);
        assert!(validate_registration(&req, hours()).contains("company_name"));
    }

    #[test]
    fn password_problems_are_reported_per_field() {
        let mut req = request(ProfileType::Customer);
        req.password = "12345678".to_string();
        req.confirm_password = "different1".to_string();
        let errors = validate_registration(&req, hours());
        assert!(errors.contains("password"));
        assert!(errors.contains("confirm_password"));
    }

    #[test]
    fn staff_need_role_specializations_and_valid_hours() {
        let mut req = request(ProfileType::Staff);
        req.availability.insert(
            "monday".to_string(),
            AvailabilityWindow {
                start: Some("07:00".to_string()),
                end: Some("12:00".to_string()),
            },
        );
        let errors = validate_registration(&req, hours());
        assert!(errors.contains("staff_role"));
        assert!(errors.contains("specializations"));
        assert!(errors.contains("availability"));

        req.staff_role = Some(StaffRole::Technician);
        req.specializations = vec!["laptops".to_string()];
        req.availability.insert(
            "monday".to_string(),
            AvailabilityWindow {
                start: Some("08:00".to_string()),
                end: Some("16:00".to_string()),
            },
        );
        assert!(validate_registration(&req, hours()).is_empty());
    }
}
