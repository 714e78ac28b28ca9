use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub external_subject: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn full_name(&self) -> String {
        format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "customer_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CustomerRole {
    Individual,
    Company,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "contact_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContactMethod {
    #[default]
    Email,
    PhoneCall,
    Sms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "staff_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    Technician,
    Admin,
    Receptionist,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerProfile {
    pub id: i64,
    pub account_id: Uuid,
    pub role: Option<CustomerRole>,
    pub preferred_contact: ContactMethod,
    pub company_name: Option<String>,
    pub login_token: Option<String>,
    pub address: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One day's working window as stored. Both ends are `HH:MM` strings and may be
/// missing or malformed in legacy rows, so they stay raw until a booking is checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// Lower-case weekday name (`monday` .. `sunday`) to working window.
pub type WeeklyAvailability = BTreeMap<String, AvailabilityWindow>;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StaffProfile {
    pub id: i64,
    pub account_id: Uuid,
    pub role: StaffRole,
    pub specializations: Vec<String>,
    pub availability: Json<WeeklyAvailability>,
    pub login_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The caller's role, derived once from the account flags and whichever profile exists.
#[derive(Debug, Clone)]
pub enum Role {
    Customer(CustomerProfile),
    Staff(StaffProfile),
    Admin(Option<StaffProfile>),
}

impl Role {
    /// Superusers are admins whatever profile they carry; otherwise the single
    /// profile decides. An account with no profile has no role.
    pub fn derive(
        account: &Account,
        customer: Option<CustomerProfile>,
        staff: Option<StaffProfile>,
    ) -> Option<Role> {
        if account.is_superuser {
            return Some(Role::Admin(staff));
        }
        match (staff, customer) {
            (Some(staff), _) => Some(Role::Staff(staff)),
            (None, Some(customer)) => Some(Role::Customer(customer)),
            (None, None) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Customer(_) => "customer",
            Role::Staff(_) => "staff",
            Role::Admin(_) => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin(_))
    }

    pub fn is_staff_side(&self) -> bool {
        !matches!(self, Role::Customer(_))
    }

    pub fn customer_profile(&self) -> Option<&CustomerProfile> {
        match self {
            Role::Customer(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn staff_profile(&self) -> Option<&StaffProfile> {
        match self {
            Role::Staff(profile) => Some(profile),
            Role::Admin(profile) => profile.as_ref(),
            Role::Customer(_) => None,
        }
    }

    pub fn profile_json(&self) -> serde_json::Value {
        match self {
            Role::Customer(profile) => serde_json::to_value(profile).unwrap_or_default(),
            Role::Staff(profile) => serde_json::to_value(profile).unwrap_or_default(),
            Role::Admin(Some(profile)) => serde_json::to_value(profile).unwrap_or_default(),
            Role::Admin(None) => serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            full_name: account.full_name(),
            id: account.id,
            email: account.email,
            first_name: account.first_name.unwrap_or_default(),
            last_name: account.last_name.unwrap_or_default(),
            phone_number: account.phone_number,
            email_verified: account.email_verified,
            phone_verified: account.phone_verified,
            is_active: account.is_active,
            last_login: account.last_login,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(is_superuser: bool) -> Account {
        Account {
            id: Uuid::new_v4(),
            email: "tech@example.com".to_string(),
            external_subject: Some("sub-1".to_string()),
            password_hash: String::new(),
            first_name: Some("Ada".to_string()),
            last_name: None,
            phone_number: None,
            email_verified: false,
            phone_verified: false,
            is_active: true,
            is_staff: true,
            is_superuser,
            last_login: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn staff_profile(account_id: Uuid) -> StaffProfile {
        StaffProfile {
            id: 7,
            account_id,
            role: StaffRole::Technician,
            specializations: vec!["laptops".to_string()],
            availability: Json(WeeklyAvailability::new()),
            login_token: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn superuser_is_admin_and_keeps_staff_profile() {
        let account = account(true);
        let role = Role::derive(&account, None, Some(staff_profile(account.id))).unwrap();
        assert_eq!(role.name(), "admin");
        assert_eq!(role.staff_profile().map(|p| p.id), Some(7));
    }

    #[test]
    fn staff_profile_wins_for_regular_accounts() {
        let account = account(false);
        let role = Role::derive(&account, None, Some(staff_profile(account.id))).unwrap();
        assert!(matches!(role, Role::Staff(_)));
        assert!(role.is_staff_side());
    }

    #[test]
    fn account_without_profile_has_no_role() {
        assert!(Role::derive(&account(false), None, None).is_none());
    }

    #[test]
    fn full_name_trims_missing_parts() {
        assert_eq!(account(false).full_name(), "Ada");
    }
}
