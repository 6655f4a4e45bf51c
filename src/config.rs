//! Portal configuration parsed from environment variables.
//!
//! Every knob has a default, so an empty environment yields a runnable
//! service: in-memory documents, no admin account, and a student realm that
//! rejects every sign-in until an identity toolkit key is configured.

use std::fmt;
use std::time::Duration;

use crate::services::gate::CheckStrategy;
use crate::services::identity_toolkit::DEFAULT_IDENTITY_TOOLKIT_BASE_URL;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_SESSION_IDLE_TTL_SECS: u64 = 3600;
pub const DEFAULT_SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_ADMIN_LOGIN_ROUTE: &str = "/admin/login";
pub const DEFAULT_ADMIN_LANDING_ROUTE: &str = "/admin/notifications";
pub const DEFAULT_STUDENT_LOGIN_ROUTE: &str = "/signin";
pub const DEFAULT_STUDENT_LANDING_ROUTE: &str = "/dashboard";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("{0} is required")]
    Missing(&'static str),
}

impl crate::frame::ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "E_CONFIG_INVALID",
            Self::Missing(_) => "E_CONFIG_MISSING",
        }
    }
}

/// Accepts `1/true/yes/on` and `0/false/no/off`, case-insensitively.
#[must_use]
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// Where a realm's credentials are checked.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthBackend {
    /// Fixed accounts as `(identifier, secret)` pairs.
    Static { accounts: Vec<(String, String)> },
    /// Hosted identity toolkit REST API. `allowlist` is a comma-separated
    /// email list; empty admits every account the service accepts.
    IdentityToolkit { base_url: String, api_key: String, allowlist: String },
}

impl fmt::Debug for AuthBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static { accounts } => f
                .debug_struct("Static")
                .field("accounts", &accounts.iter().map(|(id, _)| id).collect::<Vec<_>>())
                .finish(),
            Self::IdentityToolkit { base_url, allowlist, .. } => f
                .debug_struct("IdentityToolkit")
                .field("base_url", base_url)
                .field("allowlist", allowlist)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmConfig {
    pub auth: AuthBackend,
    pub check: CheckStrategy,
    pub login_route: String,
    pub landing_route: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub admin: RealmConfig,
    pub student: RealmConfig,
    pub session_idle_ttl: Duration,
    pub session_sweep_interval: Duration,
    pub cookie_secure: bool,
}

// =============================================================================
// PARSING
// =============================================================================

impl PortalConfig {
    /// Build typed config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparseable values or an incomplete admin
    /// auth setup.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build typed config from an arbitrary key lookup.
    ///
    /// Recognised keys: `PORT`, `DATABASE_URL`, `DB_MAX_CONNECTIONS`,
    /// `ADMIN_AUTH` (`static` | `identity_toolkit`), `ADMIN_ID`,
    /// `ADMIN_PASSWORD`, `ADMIN_ALLOWLIST`, `IDENTITY_TOOLKIT_API_KEY`,
    /// `IDENTITY_TOOLKIT_BASE_URL`, `ADMIN_SESSION_CHECK`,
    /// `STUDENT_SESSION_CHECK` (`provider` | `flag`), `ADMIN_LOGIN_ROUTE`,
    /// `ADMIN_LANDING_ROUTE`, `STUDENT_LOGIN_ROUTE`, `STUDENT_LANDING_ROUTE`,
    /// `SESSION_IDLE_TTL_SECS`, `SESSION_SWEEP_INTERVAL_SECS`,
    /// `COOKIE_SECURE`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for unparseable values or an incomplete admin
    /// auth setup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let base_url = get("IDENTITY_TOOLKIT_BASE_URL")
            .unwrap_or_else(|| DEFAULT_IDENTITY_TOOLKIT_BASE_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();
        let api_key = get("IDENTITY_TOOLKIT_API_KEY");

        let admin_auth = match get("ADMIN_AUTH").as_deref().unwrap_or("static") {
            "static" => {
                let accounts = match (get("ADMIN_ID"), lookup("ADMIN_PASSWORD")) {
                    (Some(id), Some(secret)) if !secret.is_empty() => vec![(id, secret)],
                    (Some(_), _) => return Err(ConfigError::Missing("ADMIN_PASSWORD")),
                    (None, _) => Vec::new(),
                };
                AuthBackend::Static { accounts }
            }
            "identity_toolkit" => AuthBackend::IdentityToolkit {
                base_url: base_url.clone(),
                api_key: api_key.clone().ok_or(ConfigError::Missing("IDENTITY_TOOLKIT_API_KEY"))?,
                allowlist: get("ADMIN_ALLOWLIST").unwrap_or_default(),
            },
            other => return Err(ConfigError::Invalid { key: "ADMIN_AUTH", value: other.to_owned() }),
        };

        let student_auth = match api_key {
            Some(api_key) => AuthBackend::IdentityToolkit { base_url, api_key, allowlist: String::new() },
            None => AuthBackend::Static { accounts: Vec::new() },
        };

        let admin = RealmConfig {
            auth: admin_auth,
            check: parse_check(&get, "ADMIN_SESSION_CHECK", CheckStrategy::Flag)?,
            login_route: parse_route(&get, "ADMIN_LOGIN_ROUTE", DEFAULT_ADMIN_LOGIN_ROUTE)?,
            landing_route: parse_route(&get, "ADMIN_LANDING_ROUTE", DEFAULT_ADMIN_LANDING_ROUTE)?,
        };
        let student = RealmConfig {
            auth: student_auth,
            check: parse_check(&get, "STUDENT_SESSION_CHECK", CheckStrategy::Provider)?,
            login_route: parse_route(&get, "STUDENT_LOGIN_ROUTE", DEFAULT_STUDENT_LOGIN_ROUTE)?,
            landing_route: parse_route(&get, "STUDENT_LANDING_ROUTE", DEFAULT_STUDENT_LANDING_ROUTE)?,
        };

        let cookie_secure = match get("COOKIE_SECURE") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid { key: "COOKIE_SECURE", value: raw })?,
            None => false,
        };

        Ok(Self {
            port: parse_number(&get, "PORT", DEFAULT_PORT)?,
            database_url: get("DATABASE_URL"),
            db_max_connections: parse_number(&get, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            admin,
            student,
            session_idle_ttl: Duration::from_secs(parse_number(
                &get,
                "SESSION_IDLE_TTL_SECS",
                DEFAULT_SESSION_IDLE_TTL_SECS,
            )?),
            session_sweep_interval: Duration::from_secs(
                parse_number(&get, "SESSION_SWEEP_INTERVAL_SECS", DEFAULT_SESSION_SWEEP_INTERVAL_SECS)?.max(1),
            ),
            cookie_secure,
        })
    }
}

fn parse_number<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn parse_check(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: CheckStrategy,
) -> Result<CheckStrategy, ConfigError> {
    match get(key) {
        Some(raw) => CheckStrategy::from_str(&raw).ok_or(ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn parse_route(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: &str) -> Result<String, ConfigError> {
    match get(key) {
        Some(raw) if raw.starts_with('/') && !raw.starts_with("//") => Ok(raw),
        Some(raw) => Err(ConfigError::Invalid { key, value: raw }),
        None => Ok(default.to_owned()),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
