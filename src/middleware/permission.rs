use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::RequestPartsExt;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use tower_cookies::Cookies;

use crate::error::AppError;
use crate::models::{Account, Role};
use crate::state::AppState;
use crate::store::accounts;

pub const AUTH_COOKIE: &str = "auth_token";
pub const LOGIN_TOKEN_HEADER: &str = "x-login-token";

/// The authenticated caller with its role resolved once per request.
#[derive(Debug, Clone)]
pub struct CurrentAccount {
    pub account: Account,
    pub role: Role,
}

enum Credential {
    Token(String),
    LoginToken(String),
}

impl CurrentAccount {
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.role.is_staff_side() {
            Ok(())
        } else {
            Err(AppError::Forbidden("staff access required"))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("superuser access required"))
        }
    }

    /// Customer profile id when the caller is a customer.
    pub fn customer_id(&self) -> Option<i64> {
        self.role.customer_profile().map(|p| p.id)
    }

    pub fn display_name(&self) -> String {
        let name = self.account.full_name();
        if name.is_empty() {
            self.account.email.clone()
        } else {
            name
        }
    }
}

/// Bearer header, then login token header, then the console cookie.
async fn credential(parts: &mut Parts, state: &AppState) -> Option<Credential> {
    if let Ok(TypedHeader(Authorization(bearer))) =
        parts.extract::<TypedHeader<Authorization<Bearer>>>().await
    {
        return Some(Credential::Token(bearer.token().to_string()));
    }

    if let Some(token) = parts
        .headers
        .get(LOGIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(Credential::LoginToken(token.to_string()));
    }

    let cookies = Cookies::from_request_parts(parts, state).await.ok()?;
    cookies
        .get(AUTH_COOKIE)
        .map(|cookie| Credential::Token(cookie.value().to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAccount {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(current) = parts.extensions.get::<CurrentAccount>() {
            return Ok(current.clone());
        }

        let account = match credential(parts, state).await.ok_or(AppError::Unauthenticated)? {
            Credential::Token(token) => {
                let identity = state.identity.verify(&token).await?;
                accounts::find_by_subject(&state.db, &identity.subject).await?
            }
            Credential::LoginToken(token) => accounts::find_by_login_token(&state.db, &token)
                .await?
                .ok_or_else(|| AppError::InvalidCredential("unknown login token".to_string()))
                .map(Some)?,
        };

        let account = account
            .filter(|account| account.is_active)
            .ok_or(AppError::UnknownAccount)?;
        let role = accounts::load_role(&state.db, &account)
            .await?
            .ok_or(AppError::UnknownAccount)?;

        let current = CurrentAccount { account, role };
        parts.extensions.insert(current.clone());
        Ok(current)
    }
}
