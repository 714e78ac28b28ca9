//! Firebase Authentication: ID token verification against Google's published keys
//! and account administration through the Identity Toolkit REST API.

use std::path::Path;
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use super::{IdentityClaims, IdentityError, IdentityProvider, IssuedToken, NewIdentity, VerifiedIdentity};

const JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";
const TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const ADMIN_SCOPE: &str =
    "https://www.googleapis.com/auth/identitytoolkit https://www.googleapis.com/auth/firebase";
const JWKS_TTL: StdDuration = StdDuration::from_secs(3600);
const CLOCK_SKEW_SECONDS: u64 = 30;

/// Fields of the service-account JSON file this provider needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    auth_time: Option<i64>,
    iat: i64,
}

#[derive(Debug, Serialize)]
struct GrantClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    valid_since: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
}

struct CachedKeys {
    fetched: Instant,
    keys: JwkSet,
}

struct CachedAccessToken {
    expires: Instant,
    token: String,
}

pub struct FirebaseIdentityProvider {
    http: Client,
    project_id: String,
    account: ServiceAccount,
    signing_key: EncodingKey,
    check_revoked: bool,
    keys: RwLock<Option<CachedKeys>>,
    access_token: RwLock<Option<CachedAccessToken>>,
}

impl FirebaseIdentityProvider {
    pub fn new(
        project_id: String,
        account: ServiceAccount,
        check_revoked: bool,
    ) -> Result<Self, IdentityError> {
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| IdentityError::Upstream(format!("invalid service account key: {}", e)))?;
        let http = Client::builder()
            .timeout(StdDuration::from_secs(15))
            .build()?;

        Ok(Self {
            http,
            project_id,
            account,
            signing_key,
            check_revoked,
            keys: RwLock::new(None),
            access_token: RwLock::new(None),
        })
    }

    pub fn from_credentials_file(
        project_id: String,
        path: &Path,
        check_revoked: bool,
    ) -> Result<Self, IdentityError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IdentityError::Upstream(format!("cannot read {}: {}", path.display(), e))
        })?;
        let account: ServiceAccount = serde_json::from_str(&raw)
            .map_err(|e| IdentityError::Upstream(format!("invalid service account file: {}", e)))?;
        Self::new(project_id, account, check_revoked)
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    fn admin_url(&self, method: &str) -> String {
        format!("{}/projects/{}/{}", TOOLKIT_URL, self.project_id, method)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, IdentityError> {
        {
            let cached = self.keys.read().await;
            if let Some(cache) = cached.as_ref() {
                if cache.fetched.elapsed() < JWKS_TTL {
                    if let Some(jwk) = cache.keys.find(kid) {
                        return DecodingKey::from_jwk(jwk)
                            .map_err(|e| IdentityError::InvalidToken(e.to_string()));
                    }
                }
            }
        }

        let keys: JwkSet = self
            .http
            .get(JWKS_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        log::info!("refreshed firebase signing keys ({} keys)", keys.keys.len());

        let key = keys
            .find(kid)
            .ok_or_else(|| IdentityError::InvalidToken("unknown signing key".to_string()))
            .and_then(|jwk| {
                DecodingKey::from_jwk(jwk).map_err(|e| IdentityError::InvalidToken(e.to_string()))
            });

        *self.keys.write().await = Some(CachedKeys {
            fetched: Instant::now(),
            keys,
        });
        key
    }

    async fn bearer(&self) -> Result<String, IdentityError> {
        {
            let cached = self.access_token.read().await;
            if let Some(token) = cached.as_ref() {
                if token.expires > Instant::now() {
                    return Ok(token.token.clone());
                }
            }
        }

        let now = Utc::now().timestamp();
        let grant = GrantClaims {
            iss: &self.account.client_email,
            scope: ADMIN_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &grant, &self.signing_key)
            .map_err(|e| IdentityError::Upstream(e.to_string()))?;
        let body = format!(
            "grant_type={}&assertion={}",
            urlencoding::encode("urn:ietf:params:oauth:grant-type:jwt-bearer"),
            urlencoding::encode(&assertion)
        );

        let response: AccessTokenResponse = self
            .http
            .post(&self.account.token_uri)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let lifetime = response.expires_in.saturating_sub(60);
        *self.access_token.write().await = Some(CachedAccessToken {
            expires: Instant::now() + StdDuration::from_secs(lifetime),
            token: response.access_token.clone(),
        });
        Ok(response.access_token)
    }

    async fn admin_call(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, IdentityError> {
        let bearer = self.bearer().await?;
        let response = self
            .http
            .post(self.admin_url(method))
            .bearer_auth(bearer)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        if status.is_success() {
            return Ok(body);
        }

        let message = body["error"]["message"].as_str().unwrap_or_default();
        if message.starts_with("EMAIL_EXISTS") {
            return Err(IdentityError::EmailExists);
        }
        Err(IdentityError::Upstream(format!(
            "{} failed with {}: {}",
            method, status, message
        )))
    }

    async fn check_not_revoked(&self, subject: &str, auth_time: i64) -> Result<(), IdentityError> {
        let body = self
            .admin_call("accounts:lookup", json!({ "localId": [subject] }))
            .await?;
        let lookup: LookupResponse = serde_json::from_value(body)
            .map_err(|e| IdentityError::Upstream(e.to_string()))?;
        let user = lookup
            .users
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::InvalidToken("user no longer exists".to_string()))?;

        if user.disabled {
            return Err(IdentityError::Revoked);
        }
        let valid_since = user
            .valid_since
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or_default();
        if auth_time < valid_since {
            return Err(IdentityError::Revoked);
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityProvider {
    fn name(&self) -> &'static str {
        "firebase"
    }

    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let header = decode_header(token).map_err(|e| IdentityError::InvalidToken(e.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::InvalidToken("unexpected signing algorithm".to_string()));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::InvalidToken("token has no key id".to_string()))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation.leeway = CLOCK_SKEW_SECONDS;

        let claims = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?
            .claims;
        if claims.sub.is_empty() {
            return Err(IdentityError::InvalidToken("token has no subject".to_string()));
        }

        if self.check_revoked {
            self.check_not_revoked(&claims.sub, claims.auth_time.unwrap_or(claims.iat))
                .await?;
        }

        Ok(VerifiedIdentity {
            subject: claims.sub,
            email: claims.email,
        })
    }

    async fn create_account(&self, identity: &NewIdentity) -> Result<String, IdentityError> {
        let mut payload = json!({
            "email": identity.email,
            "password": identity.password,
            "emailVerified": false,
        });
        if let Some(name) = &identity.display_name {
            payload["displayName"] = json!(name);
        }
        let body = self.admin_call("accounts", payload).await?;
        let created: SignUpResponse =
            serde_json::from_value(body).map_err(|e| IdentityError::Upstream(e.to_string()))?;
        Ok(created.local_id)
    }

    async fn delete_account(&self, subject: &str) -> Result<(), IdentityError> {
        self.admin_call("accounts:delete", json!({ "localId": subject }))
            .await
            .map(|_| ())
    }

    async fn sync_claims(&self, subject: &str, claims: &IdentityClaims) -> Result<(), IdentityError> {
        let attributes =
            serde_json::to_string(claims).map_err(|e| IdentityError::Upstream(e.to_string()))?;
        self.admin_call(
            "accounts:update",
            json!({ "localId": subject, "customAttributes": attributes }),
        )
        .await
        .map(|_| ())
    }

    async fn update_password(&self, subject: &str, password: &str) -> Result<(), IdentityError> {
        self.admin_call(
            "accounts:update",
            json!({ "localId": subject, "password": password }),
        )
        .await
        .map(|_| ())
    }

    async fn issue_token(&self, _subject: &str, _email: &str) -> Result<IssuedToken, IdentityError> {
        Err(IdentityError::Unsupported("password login"))
    }
}
