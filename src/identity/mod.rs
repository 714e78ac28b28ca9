//! Identity providers. Tokens are verified here and resolved to local accounts by
//! the middleware; account records on the provider side are created and removed
//! alongside local registration.

pub mod firebase;
pub mod local;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

pub use firebase::FirebaseIdentityProvider;
pub use local::LocalIdentityProvider;

/// Result of a successful token verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Stable provider-side subject id.
    pub subject: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

/// Custom claims mirrored onto the provider-side record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityClaims {
    pub is_superuser: bool,
    pub is_staff: bool,
    pub account_id: Uuid,
    pub email_verified: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("{0}")]
    InvalidToken(String),

    #[error("token has been revoked")]
    Revoked,

    #[error("email is already registered with the identity provider")]
    EmailExists,

    #[error("{0} is not supported by this identity provider")]
    Unsupported(&'static str),

    #[error("{0}")]
    Upstream(String),
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        IdentityError::Upstream(err.to_string())
    }
}

/// External identity provider.
///
/// Object safe; the application holds it as `Arc<dyn IdentityProvider>`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checks signature, expiry and (where supported) revocation.
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;

    /// Creates the provider-side record and returns its subject id.
    async fn create_account(&self, identity: &NewIdentity) -> Result<String, IdentityError>;

    async fn delete_account(&self, subject: &str) -> Result<(), IdentityError>;

    async fn sync_claims(&self, subject: &str, claims: &IdentityClaims) -> Result<(), IdentityError>;

    async fn update_password(&self, subject: &str, password: &str) -> Result<(), IdentityError>;

    /// Issues a session token after a local password check. Providers whose
    /// clients sign in directly return `Unsupported`.
    async fn issue_token(&self, subject: &str, email: &str) -> Result<IssuedToken, IdentityError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: i64,
}

#[cfg(test)]
pub mod testing {
    //! In-memory provider for router tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Accepts `token-<subject>` tokens and records every call.
    #[derive(Default)]
    pub struct StubIdentityProvider {
        pub created: Mutex<Vec<String>>,
        pub deleted: Mutex<Vec<String>>,
        pub claims: Mutex<HashMap<String, IdentityClaims>>,
        pub fail_create: bool,
    }

    #[async_trait]
    impl IdentityProvider for StubIdentityProvider {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
            token
                .strip_prefix("token-")
                .map(|subject| VerifiedIdentity {
                    subject: subject.to_string(),
                    email: None,
                })
                .ok_or_else(|| IdentityError::InvalidToken("malformed token".to_string()))
        }

        async fn create_account(&self, identity: &NewIdentity) -> Result<String, IdentityError> {
            if self.fail_create {
                return Err(IdentityError::Upstream("provider unavailable".to_string()));
            }
            let subject = format!("stub-{}", identity.email);
            if let Ok(mut created) = self.created.lock() {
                created.push(subject.clone());
            }
            Ok(subject)
        }

        async fn delete_account(&self, subject: &str) -> Result<(), IdentityError> {
            if let Ok(mut deleted) = self.deleted.lock() {
                deleted.push(subject.to_string());
            }
            Ok(())
        }

        async fn sync_claims(
            &self,
            subject: &str,
            claims: &IdentityClaims,
        ) -> Result<(), IdentityError> {
            if let Ok(mut map) = self.claims.lock() {
                map.insert(subject.to_string(), claims.clone());
            }
            Ok(())
        }

        async fn update_password(&self, _subject: &str, _password: &str) -> Result<(), IdentityError> {
            Ok(())
        }

        async fn issue_token(&self, subject: &str, _email: &str) -> Result<IssuedToken, IdentityError> {
            Ok(IssuedToken {
                token: format!("token-{}", subject),
                expires_in: 3600,
            })
        }
    }
}
