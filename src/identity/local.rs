//! HS256 tokens issued by this service. Passwords are checked against the local
//! bcrypt hash before a token is issued.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{IdentityClaims, IdentityError, IdentityProvider, IssuedToken, NewIdentity, VerifiedIdentity};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(subject: &str, email: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: subject.to_string(),
            email: email.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }
}

pub struct LocalIdentityProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl LocalIdentityProvider {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn create_token(&self, subject: &str, email: &str) -> Result<String, IdentityError> {
        let claims = Claims::new(subject, email, self.ttl);
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| IdentityError::Upstream(e.to_string()))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, IdentityError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let claims = self.verify_token(token)?;
        Ok(VerifiedIdentity {
            subject: claims.sub,
            email: Some(claims.email),
        })
    }

    async fn create_account(&self, _identity: &NewIdentity) -> Result<String, IdentityError> {
        Ok(Uuid::new_v4().to_string())
    }

    // Local subjects live only in the accounts table.
    async fn delete_account(&self, _subject: &str) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn sync_claims(&self, _subject: &str, _claims: &IdentityClaims) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn update_password(&self, _subject: &str, _password: &str) -> Result<(), IdentityError> {
        Ok(())
    }

    async fn issue_token(&self, subject: &str, email: &str) -> Result<IssuedToken, IdentityError> {
        Ok(IssuedToken {
            token: self.create_token(subject, email)?,
            expires_in: self.ttl.num_seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn issued_tokens_verify_to_the_same_subject() {
        let provider = LocalIdentityProvider::new("test-secret", 1);
        let issued = provider.issue_token("sub-1", "a@example.com").await.unwrap();
        let identity = provider.verify(&issued.token).await.unwrap();
        assert_eq!(identity.subject, "sub-1");
        assert_eq!(identity.email.as_deref(), Some("a@example.com"));
        assert_eq!(issued.expires_in, 3600);
    }

    #[tokio::test]
    async fn tokens_from_another_secret_are_rejected() {
        let ours = LocalIdentityProvider::new("secret-a", 1);
        let theirs = LocalIdentityProvider::new("secret-b", 1);
        let token = theirs.create_token("sub-1", "a@example.com").unwrap();
        assert!(matches!(
            ours.verify(&token).await,
            Err(IdentityError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let provider = LocalIdentityProvider::new("secret", -2);
        let token = provider.create_token("sub-1", "a@example.com").unwrap();
        assert!(provider.verify(&token).await.is_err());
    }
}
