//! Accounts and their customer or staff profiles.

use std::future::Future;

use serde::Deserialize;
use sqlx::types::Json;
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::database::Database;
use crate::error::{AppError, Result};
use crate::identity::{IdentityClaims, IdentityProvider, NewIdentity};
use crate::models::{
    Account, ContactMethod, CustomerProfile, CustomerRole, Role, StaffProfile, StaffRole,
    WeeklyAvailability,
};
use crate::utils::generate_login_token;
use crate::validation::{normalize_email, validate_email, validate_password, FieldErrors};

pub struct NewAccount<'a> {
    pub email: &'a str,
    pub external_subject: &'a str,
    pub password_hash: &'a str,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub phone_number: Option<&'a str>,
    pub is_staff: bool,
}

pub struct NewCustomerProfile {
    pub role: CustomerRole,
    pub preferred_contact: ContactMethod,
    pub company_name: Option<String>,
    pub address: String,
}

pub struct NewStaffProfile {
    pub role: StaffRole,
    pub specializations: Vec<String>,
    pub availability: WeeklyAvailability,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccountPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
}

pub fn claims_for(account: &Account) -> IdentityClaims {
    IdentityClaims {
        is_superuser: account.is_superuser,
        is_staff: account.is_staff,
        account_id: account.id,
        email_verified: account.email_verified,
    }
}

pub async fn insert_account(conn: &mut PgConnection, new: &NewAccount<'_>) -> Result<Account> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        INSERT INTO accounts (email, external_subject, password_hash, first_name, last_name,
                              phone_number, is_staff)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(normalize_email(new.email))
    .bind(new.external_subject)
    .bind(new.password_hash)
    .bind(new.first_name)
    .bind(new.last_name)
    .bind(new.phone_number)
    .bind(new.is_staff)
    .fetch_one(conn)
    .await?;

    Ok(account)
}

pub async fn insert_customer_profile(
    conn: &mut PgConnection,
    account_id: Uuid,
    profile: &NewCustomerProfile,
) -> Result<CustomerProfile> {
    let profile = sqlx::query_as::<_, CustomerProfile>(
        r#"
        INSERT INTO customer_profiles (account_id, role, preferred_contact, company_name,
                                       address, login_token)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(profile.role)
    .bind(profile.preferred_contact)
    .bind(&profile.company_name)
    .bind(&profile.address)
    .bind(generate_login_token())
    .fetch_one(conn)
    .await?;

    Ok(profile)
}

pub async fn insert_staff_profile(
    conn: &mut PgConnection,
    account_id: Uuid,
    profile: &NewStaffProfile,
) -> Result<StaffProfile> {
    let profile = sqlx::query_as::<_, StaffProfile>(
        r#"
        INSERT INTO staff_profiles (account_id, role, specializations, availability, login_token)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(account_id)
    .bind(profile.role)
    .bind(&profile.specializations)
    .bind(Json(&profile.availability))
    .bind(generate_login_token())
    .fetch_one(conn)
    .await?;

    Ok(profile)
}

pub async fn find_by_id<'e>(db: impl PgExecutor<'e>, id: Uuid) -> Result<Account> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("account", id))
}

pub async fn find_by_subject(db: &Database, subject: &str) -> Result<Option<Account>> {
    let account =
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE external_subject = $1")
            .bind(subject)
            .fetch_optional(db)
            .await?;
    Ok(account)
}

pub async fn find_by_email(db: &Database, email: &str) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
        .bind(normalize_email(email))
        .fetch_optional(db)
        .await?;
    Ok(account)
}

/// Owner of the customer or staff profile carrying `token`.
pub async fn find_by_login_token(db: &Database, token: &str) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        SELECT a.* FROM accounts a
        WHERE a.id = (SELECT account_id FROM customer_profiles WHERE login_token = $1)
           OR a.id = (SELECT account_id FROM staff_profiles WHERE login_token = $1)
        LIMIT 1
        "#,
    )
    .bind(token)
    .fetch_optional(db)
    .await?;
    Ok(account)
}

pub async fn customer_profile(db: &Database, account_id: Uuid) -> Result<Option<CustomerProfile>> {
    let profile = sqlx::query_as::<_, CustomerProfile>(
        "SELECT * FROM customer_profiles WHERE account_id = $1",
    )
    .bind(account_id)
    .fetch_optional(db)
    .await?;
    Ok(profile)
}

pub async fn staff_profile(db: &Database, account_id: Uuid) -> Result<Option<StaffProfile>> {
    let profile =
        sqlx::query_as::<_, StaffProfile>("SELECT * FROM staff_profiles WHERE account_id = $1")
            .bind(account_id)
            .fetch_optional(db)
            .await?;
    Ok(profile)
}

pub async fn load_role(db: &Database, account: &Account) -> Result<Option<Role>> {
    let customer = customer_profile(db, account.id).await?;
    let staff = staff_profile(db, account.id).await?;
    Ok(Role::derive(account, customer, staff))
}

/// Accounts visible to the caller: superusers see everyone, other staff see
/// customers, customers see themselves.
pub async fn list_visible(db: &Database, viewer: &Account, role: &Role) -> Result<Vec<Account>> {
    let accounts = match role {
        Role::Admin(_) => {
            sqlx::query_as::<_, Account>("SELECT * FROM accounts ORDER BY created_at DESC")
                .fetch_all(db)
                .await?
        }
        Role::Staff(_) => {
            sqlx::query_as::<_, Account>(
                r#"
                SELECT a.* FROM accounts a
                JOIN customer_profiles c ON c.account_id = a.id
                ORDER BY a.created_at DESC
                "#,
            )
            .fetch_all(db)
            .await?
        }
        Role::Customer(_) => vec![find_by_id(db, viewer.id).await?],
    };
    Ok(accounts)
}

pub async fn can_view(db: &Database, viewer: &Account, role: &Role, target: Uuid) -> Result<bool> {
    if viewer.id == target || role.is_admin() {
        return Ok(true);
    }
    if role.is_staff_side() {
        return Ok(customer_profile(db, target).await?.is_some());
    }
    Ok(false)
}

pub async fn update_account(db: &Database, id: Uuid, patch: &AccountPatch) -> Result<Account> {
    sqlx::query_as::<_, Account>(
        r#"
        UPDATE accounts
        SET first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            phone_number = COALESCE($4, phone_number),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&patch.first_name)
    .bind(&patch.last_name)
    .bind(&patch.phone_number)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::not_found("account", id))
}

pub async fn set_password_hash(db: &Database, id: Uuid, password_hash: &str) -> Result<()> {
    sqlx::query("UPDATE accounts SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(password_hash)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn toggle_active(db: &Database, id: Uuid) -> Result<Account> {
    sqlx::query_as::<_, Account>(
        "UPDATE accounts SET is_active = NOT is_active, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| AppError::not_found("account", id))
}

pub async fn touch_last_login(db: &Database, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE accounts SET last_login = NOW() WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

/// Replaces the login token on whichever profile the role carries.
pub async fn regenerate_login_token(db: &Database, role: &Role) -> Result<String> {
    let token = generate_login_token();
    let (table, profile_id) = match (role.customer_profile(), role.staff_profile()) {
        (Some(profile), _) => ("customer_profiles", profile.id),
        (None, Some(profile)) => ("staff_profiles", profile.id),
        (None, None) => return Err(AppError::field("profile", "account has no profile")),
    };

    sqlx::query(&format!(
        "UPDATE {} SET login_token = $2, updated_at = NOW() WHERE id = $1",
        table
    ))
    .bind(profile_id)
    .bind(&token)
    .execute(db)
    .await?;

    Ok(token)
}

/// Grants superuser and staff flags to the configured account, if it exists, and
/// pushes the new claims to the identity provider.
pub async fn bootstrap_admin(
    db: &Database,
    identity: &dyn IdentityProvider,
    email: &str,
) -> Result<Option<Account>> {
    let account = sqlx::query_as::<_, Account>(
        r#"
        UPDATE accounts
        SET is_superuser = TRUE, is_staff = TRUE, updated_at = NOW()
        WHERE email = $1
        RETURNING *
        "#,
    )
    .bind(normalize_email(email))
    .fetch_optional(db)
    .await?;

    let Some(account) = account else {
        log::warn!("bootstrap admin {} has not registered yet", email);
        return Ok(None);
    };

    if let Some(subject) = &account.external_subject {
        identity.sync_claims(subject, &claims_for(&account)).await?;
    }
    log::info!("bootstrap admin {} promoted", account.email);
    Ok(Some(account))
}

/// Creates the provider-side account, then runs `persist` with its subject. If
/// `persist` fails the provider account is deleted again, so neither side keeps
/// a half-registered user.
pub async fn with_provider_account<T, F, Fut>(
    provider: &dyn IdentityProvider,
    identity: &NewIdentity,
    persist: F,
) -> Result<T>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let subject = provider.create_account(identity).await?;
    match persist(subject.clone()).await {
        Ok(value) => Ok(value),
        Err(err) => {
            log::warn!(
                "local write for {} failed, removing identity {}: {}",
                identity.email,
                subject,
                err
            );
            if let Err(cleanup) = provider.delete_account(&subject).await {
                log::error!("could not remove identity {}: {}", subject, cleanup);
            }
            Err(err)
        }
    }
}

pub struct NewSuperuser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

impl NewSuperuser<'_> {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        errors.check("email", validate_email(self.email));
        errors.check("password", validate_password(self.password));
        if self.first_name.trim().is_empty() {
            errors.add("first_name", "first name is required");
        }
        if self.last_name.trim().is_empty() {
            errors.add("last_name", "last name is required");
        }
        errors
    }
}

/// Creates a verified superuser together with its provider-side account and
/// claims. Either both sides end up with the account or neither does.
pub async fn create_superuser(
    db: &Database,
    provider: &dyn IdentityProvider,
    new: &NewSuperuser<'_>,
    password_hash: &str,
) -> Result<Account> {
    new.validate().into_result()?;
    if find_by_email(db, new.email).await?.is_some() {
        return Err(AppError::Conflict {
            field: "email".to_string(),
        });
    }

    let identity = NewIdentity {
        email: normalize_email(new.email),
        password: new.password.to_string(),
        display_name: Some(format!("{} {}", new.first_name.trim(), new.last_name.trim())),
    };
    let account = with_provider_account(provider, &identity, |subject| async move {
        let mut tx = db.begin().await?;
        let account = insert_account(
            &mut *tx,
            &NewAccount {
                email: new.email,
                external_subject: &subject,
                password_hash,
                first_name: Some(new.first_name.trim()),
                last_name: Some(new.last_name.trim()),
                phone_number: None,
                is_staff: true,
            },
        )
        .await?;
        let account = sqlx::query_as::<_, Account>(
            r#"
            UPDATE accounts
            SET is_superuser = TRUE, email_verified = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(account.id)
        .fetch_one(&mut *tx)
        .await?;
        provider.sync_claims(&subject, &claims_for(&account)).await?;
        tx.commit().await?;
        Ok(account)
    })
    .await?;

    log::info!("superuser {} created ({})", account.email, account.id);
    Ok(account)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use axum::http::StatusCode;

    use super::*;
    use crate::identity::testing::StubIdentityProvider;
    use crate::store::testing;

    fn identity(email: &str) -> NewIdentity {
        NewIdentity {
            email: email.to_string(),
            password: "secret123".to_string(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn failed_local_write_removes_the_provider_account() {
        let provider = StubIdentityProvider::default();
        let new = identity("jane@example.com");
        let result: Result<()> = with_provider_account(&provider, &new, |_| async {
            Err(AppError::Internal("disk full".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        let created = provider.created.lock().unwrap().clone();
        assert_eq!(created, vec!["stub-jane@example.com".to_string()]);
        assert_eq!(*provider.deleted.lock().unwrap(), created);
    }

    #[tokio::test]
    async fn successful_local_write_keeps_the_provider_account() {
        let provider = StubIdentityProvider::default();
        let new = identity("otieno@example.com");
        let subject = with_provider_account(&provider, &new, |subject| async move { Ok(subject) })
            .await
            .unwrap();

        assert_eq!(subject, "stub-otieno@example.com");
        assert!(provider.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn provider_failure_skips_the_local_write() {
        let provider = StubIdentityProvider {
            fail_create: true,
            ..StubIdentityProvider::default()
        };
        let touched = AtomicBool::new(false);
        let new = identity("jane@example.com");
        let err = with_provider_account(&provider, &new, |_| async {
            touched.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(!touched.load(Ordering::SeqCst));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(provider.deleted.lock().unwrap().is_empty());
    }

    #[test]
    fn superusers_need_names_and_a_strong_password() {
        let new = NewSuperuser {
            email: "owner@repairs.test",
            password: "12345678",
            first_name: " ",
            last_name: "Kamau",
        };
        let errors = new.validate();
        assert!(errors.contains("password"));
        assert!(errors.contains("first_name"));
        assert!(!errors.contains("last_name"));
    }

    #[tokio::test]
    async fn superuser_creation_pairs_both_accounts() {
        let Some(db) = testing::database().await else {
            return;
        };
        let provider = StubIdentityProvider::default();
        let email = format!("  Owner-{}@Repairs.Test ", testing::unique());
        let new = NewSuperuser {
            email: &email,
            password: "secret123",
            first_name: "Amina",
            last_name: "Kamau",
        };

        let account = create_superuser(&db, &provider, &new, "hash").await.unwrap();
        assert_eq!(account.email, normalize_email(&email));
        assert!(account.is_superuser && account.is_staff && account.email_verified);

        let subject = format!("stub-{}", normalize_email(&email));
        assert_eq!(account.external_subject.as_deref(), Some(subject.as_str()));
        let claims = provider.claims.lock().unwrap().get(&subject).cloned().unwrap();
        assert!(claims.is_superuser);
        assert_eq!(claims.account_id, account.id);

        assert!(matches!(
            create_superuser(&db, &provider, &new, "hash").await,
            Err(AppError::Conflict { .. })
        ));
        assert_eq!(provider.created.lock().unwrap().len(), 1);
    }
}
