//! Process configuration, read once at startup from the environment.

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

use hrdesk_auth::HashingParams;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ")]
    IdenticalSecrets,
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Return the reset token in the HTTP response body (dev convenience).
    pub expose_reset_token: bool,
    /// Seed roster for the in-memory employee directory.
    pub dev_employee_emails: Vec<String>,
    pub hashing: HashingParams,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("access_token_secret", &"<redacted>")
            .field("refresh_token_secret", &"<redacted>")
            .field("use_persistent_stores", &self.use_persistent_stores)
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("database_max_connections", &self.database_max_connections)
            .field("expose_reset_token", &self.expose_reset_token)
            .field("dev_employee_emails", &self.dev_employee_emails.len())
            .field("hashing", &self.hashing)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let access_token_secret =
            get("ACCESS_TOKEN_SECRET").ok_or(ConfigError::Missing("ACCESS_TOKEN_SECRET"))?;
        let refresh_token_secret =
            get("REFRESH_TOKEN_SECRET").ok_or(ConfigError::Missing("REFRESH_TOKEN_SECRET"))?;
        if access_token_secret == refresh_token_secret {
            return Err(ConfigError::IdenticalSecrets);
        }

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let use_persistent_stores = parse_bool("USE_PERSISTENT_STORES", get("USE_PERSISTENT_STORES"), false)?;
        let database_url = get("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let database_max_connections = parse_num(
            "DATABASE_MAX_CONNECTIONS",
            get("DATABASE_MAX_CONNECTIONS"),
            DEFAULT_MAX_CONNECTIONS,
        )?;
        let expose_reset_token = parse_bool("EXPOSE_RESET_TOKEN", get("EXPOSE_RESET_TOKEN"), true)?;

        let dev_employee_emails = get("DEV_EMPLOYEE_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let defaults = HashingParams::default();
        let hashing = HashingParams {
            memory_kib: parse_num("ARGON2_MEMORY_KIB", get("ARGON2_MEMORY_KIB"), defaults.memory_kib)?,
            iterations: parse_num("ARGON2_ITERATIONS", get("ARGON2_ITERATIONS"), defaults.iterations)?,
            parallelism: parse_num("ARGON2_PARALLELISM", get("ARGON2_PARALLELISM"), defaults.parallelism)?,
        };

        Ok(Self {
            bind_addr,
            access_token_secret,
            refresh_token_secret,
            use_persistent_stores,
            database_url,
            database_max_connections,
            expose_reset_token,
            dev_employee_emails,
            hashing,
        })
    }
}

fn parse_bool(key: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_num(key: &'static str, raw: Option<String>, default: u32) -> Result<u32, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.parse::<u32>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
    }
}
