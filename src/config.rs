//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{FixedOffset, NaiveTime};

use crate::scheduling::{BusinessHours, ScheduleRules};

/// Which identity provider verifies bearer tokens and owns login credentials.
#[derive(Debug, Clone)]
pub enum IdentityConfig {
    /// HS256 tokens signed by this service.
    Local { jwt_secret: String, token_ttl_hours: i64 },
    /// Firebase Authentication.
    Firebase {
        project_id: String,
        credentials_path: PathBuf,
        check_revoked: bool,
    },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub database_max_connections: u32,
    pub business_hours: BusinessHours,
    pub shop_offset: FixedOffset,
    pub identity: IdentityConfig,
    pub bootstrap_admin_email: Option<String>,
    pub reference_prefix: String,
    pub auth_throttle_per_minute: u32,
    pub user_throttle_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `BIND_ADDR` | Server bind address | `0.0.0.0:3000` |
    /// | `DATABASE_URL` | Postgres URL | (required) |
    /// | `DATABASE_MAX_CONNECTIONS` | Pool size | `10` |
    /// | `BUSINESS_HOURS_START` | Opening time `HH:MM` | `08:00` |
    /// | `BUSINESS_HOURS_END` | Closing time `HH:MM` | `18:00` |
    /// | `SHOP_UTC_OFFSET` | Shop wall-clock offset | `+00:00` |
    /// | `IDENTITY_PROVIDER` | `local` or `firebase` | `local` |
    /// | `JWT_SECRET` | Local token secret | (required for local) |
    /// | `TOKEN_TTL_HOURS` | Local token lifetime | `24` |
    /// | `FIREBASE_PROJECT_ID` | Firebase project | (required for firebase) |
    /// | `FIREBASE_CREDENTIALS` | Service account JSON | (required for firebase) |
    /// | `FIREBASE_CHECK_REVOKED` | Revocation check on verify | `true` |
    /// | `BOOTSTRAP_ADMIN_EMAIL` | Account promoted to superuser | (unset) |
    /// | `TRANSACTION_REFERENCE_PREFIX` | Reference number prefix | `TRX` |
    /// | `AUTH_THROTTLE_PER_MINUTE` | Login/registration requests per client address | `5` |
    /// | `USER_THROTTLE_PER_MINUTE` | API requests per caller | `60` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("DATABASE_MAX_CONNECTIONS"))?;

        let start = parse_clock("BUSINESS_HOURS_START", "08:00")?;
        let end = parse_clock("BUSINESS_HOURS_END", "18:00")?;
        if start >= end {
            return Err(ConfigError::Invalid("BUSINESS_HOURS_END"));
        }

        let shop_offset = env::var("SHOP_UTC_OFFSET")
            .unwrap_or_else(|_| "+00:00".to_string())
            .parse::<FixedOffset>()
            .map_err(|_| ConfigError::Invalid("SHOP_UTC_OFFSET"))?;

        let identity = match env::var("IDENTITY_PROVIDER")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "local" => IdentityConfig::Local {
                jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
                token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                    .unwrap_or_else(|_| "24".to_string())
                    .parse()
                    .map_err(|_| ConfigError::Invalid("TOKEN_TTL_HOURS"))?,
            },
            "firebase" => IdentityConfig::Firebase {
                project_id: env::var("FIREBASE_PROJECT_ID")
                    .map_err(|_| ConfigError::Missing("FIREBASE_PROJECT_ID"))?,
                credentials_path: env::var("FIREBASE_CREDENTIALS")
                    .map(PathBuf::from)
                    .map_err(|_| ConfigError::Missing("FIREBASE_CREDENTIALS"))?,
                check_revoked: env::var("FIREBASE_CHECK_REVOKED")
                    .map(|v| v != "false" && v != "0")
                    .unwrap_or(true),
            },
            _ => return Err(ConfigError::Invalid("IDENTITY_PROVIDER")),
        };

        let bootstrap_admin_email = env::var("BOOTSTRAP_ADMIN_EMAIL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let reference_prefix =
            env::var("TRANSACTION_REFERENCE_PREFIX").unwrap_or_else(|_| "TRX".to_string());

        let auth_throttle_per_minute = parse_rate("AUTH_THROTTLE_PER_MINUTE", 5)?;
        let user_throttle_per_minute = parse_rate("USER_THROTTLE_PER_MINUTE", 60)?;

        Ok(Self {
            addr,
            database_url,
            database_max_connections,
            business_hours: BusinessHours { start, end },
            shop_offset,
            identity,
            bootstrap_admin_email,
            reference_prefix,
            auth_throttle_per_minute,
            user_throttle_per_minute,
        })
    }

    pub fn schedule_rules(&self) -> ScheduleRules {
        ScheduleRules {
            hours: self.business_hours,
            offset: self.shop_offset,
        }
    }
}

fn parse_clock(var: &'static str, default: &str) -> Result<NaiveTime, ConfigError> {
    let raw = env::var(var).unwrap_or_else(|_| default.to_string());
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| ConfigError::Invalid(var))
}

fn parse_rate(var: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(var) {
        Ok(raw) => match raw.trim().parse() {
            Ok(rate) if rate > 0 => Ok(rate),
            _ => Err(ConfigError::Invalid(var)),
        },
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid BIND_ADDR format")]
    InvalidAddr,

    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{0} has an invalid value")]
    Invalid(&'static str),
}
