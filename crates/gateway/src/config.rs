use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;
use zeroize::Zeroizing;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_PUBLIC_URL: &str = "http://localhost:8000";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 60;
pub const MAX_SESSION_TTL_MINUTES: i64 = 30 * 24 * 60;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 100;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Credentials for the operation account provisioned at startup. Operation
/// users have no signup route.
pub struct OperationSeed {
    pub email: String,
    pub password: Zeroizing<String>,
}

pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    /// Base for links handed back to callers (verification and download).
    pub public_url: String,
    pub jwt_secret: Zeroizing<String>,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub upload_dir: PathBuf,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
    pub operation_account: Option<OperationSeed>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("DOCSHARE_JWT_SECRET").ok_or(ConfigError::Missing("DOCSHARE_JWT_SECRET"))?;

        let bind_addr = parse(
            "DOCSHARE_BIND_ADDR",
            get("DOCSHARE_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;

        let public_url = get("DOCSHARE_PUBLIC_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !public_url.starts_with("http://") && !public_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                name: "DOCSHARE_PUBLIC_URL",
                value: public_url,
                reason: "must start with http:// or https://".to_string(),
            });
        }

        let session_ttl_minutes: i64 = match get("DOCSHARE_SESSION_TTL_MINUTES") {
            Some(raw) => parse("DOCSHARE_SESSION_TTL_MINUTES", raw)?,
            None => DEFAULT_SESSION_TTL_MINUTES,
        };
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&session_ttl_minutes) {
            return Err(ConfigError::Invalid {
                name: "DOCSHARE_SESSION_TTL_MINUTES",
                value: session_ttl_minutes.to_string(),
                reason: format!("must be between 1 and {MAX_SESSION_TTL_MINUTES}"),
            });
        }

        let max_upload_mb: usize = match get("DOCSHARE_MAX_UPLOAD_MB") {
            Some(raw) => parse("DOCSHARE_MAX_UPLOAD_MB", raw)?,
            None => DEFAULT_MAX_UPLOAD_MB,
        };

        let db_max_connections: u32 = match get("DOCSHARE_DB_MAX_CONNECTIONS") {
            Some(raw) => parse("DOCSHARE_DB_MAX_CONNECTIONS", raw)?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        let operation_account = match (get("DOCSHARE_OPERATION_EMAIL"), get("DOCSHARE_OPERATION_PASSWORD")) {
            (Some(email), Some(password)) => Some(OperationSeed {
                email,
                password: Zeroizing::new(password),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("DOCSHARE_OPERATION_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("DOCSHARE_OPERATION_EMAIL")),
        };

        Ok(Self {
            bind_addr,
            public_url,
            jwt_secret: Zeroizing::new(jwt_secret),
            database_url: get("DATABASE_URL"),
            db_max_connections,
            upload_dir: PathBuf::from(
                get("DOCSHARE_UPLOAD_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string()),
            ),
            session_ttl: Duration::minutes(session_ttl_minutes),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            operation_account,
        })
    }

    pub fn verification_url(&self, token: &str) -> String {
        format!("{}/client/verify-email?token={}", self.public_url, token)
    }

    pub fn download_url(&self, token: &str) -> String {
        format!("{}/client/download-by-token?token={}", self.public_url, token)
    }
}

fn parse<T>(name: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let parsed: Result<T, T::Err> = raw.trim().parse();
    parsed.map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value: raw,
    })
}
