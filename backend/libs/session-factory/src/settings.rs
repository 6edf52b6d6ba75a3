//! Typed session factory settings
//!
//! Settings are assembled from a flat property map (`connection.url`,
//! `pool.min_size`, ...) so that programmatic configuration and
//! environment variables share one parser.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::env;
use crate::error::{SessionError, SessionResult};

/// Recognized property keys
pub mod keys {
    pub const CONNECTION_URL: &str = "connection.url";
    pub const CONNECTION_DRIVER: &str = "connection.driver";
    pub const CONNECTION_USERNAME: &str = "connection.username";
    pub const CONNECTION_PASSWORD: &str = "connection.password";
    pub const CONNECTION_AUTOCOMMIT: &str = "connection.autocommit";
    pub const POOL_MIN_SIZE: &str = "pool.min_size";
    pub const POOL_MAX_SIZE: &str = "pool.max_size";
    pub const POOL_ACQUIRE_TIMEOUT_SECS: &str = "pool.acquire_timeout_secs";
    pub const POOL_CONNECT_TIMEOUT_SECS: &str = "pool.connect_timeout_secs";
    pub const POOL_IDLE_TIMEOUT_SECS: &str = "pool.idle_timeout_secs";
    pub const POOL_MAX_LIFETIME_SECS: &str = "pool.max_lifetime_secs";
    pub const SCHEMA_AUTO: &str = "schema.auto";
    pub const AUDIT_ENABLED: &str = "audit.enabled";
    pub const SQL_SHOW: &str = "sql.show";
    pub const SQL_FORMAT: &str = "sql.format";
    pub const SQL_COMMENTS: &str = "sql.comments";
    pub const FACTORY_NAME: &str = "factory.name";

    pub const ALL: &[&str] = &[
        CONNECTION_URL,
        CONNECTION_DRIVER,
        CONNECTION_USERNAME,
        CONNECTION_PASSWORD,
        CONNECTION_AUTOCOMMIT,
        POOL_MIN_SIZE,
        POOL_MAX_SIZE,
        POOL_ACQUIRE_TIMEOUT_SECS,
        POOL_CONNECT_TIMEOUT_SECS,
        POOL_IDLE_TIMEOUT_SECS,
        POOL_MAX_LIFETIME_SECS,
        SCHEMA_AUTO,
        AUDIT_ENABLED,
        SQL_SHOW,
        SQL_FORMAT,
        SQL_COMMENTS,
        FACTORY_NAME,
    ];
}

/// Database driver identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[default]
    Postgres,
}

impl FromStr for Driver {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(()),
        }
    }
}

/// Schema-update policy applied when the factory is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaAction {
    /// Leave the schema alone
    #[default]
    None,
    /// Fail if tables or columns are missing
    Validate,
    /// Create what is missing, never drop
    Update,
    /// Drop and recreate
    Create,
    /// Drop and recreate, then drop again when the factory closes
    CreateDrop,
}

impl FromStr for SchemaAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "validate" => Ok(Self::Validate),
            "update" => Ok(Self::Update),
            "create" => Ok(Self::Create),
            "create-drop" => Ok(Self::CreateDrop),
            _ => Err(()),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// PostgreSQL connection URL
    pub url: String,
    pub driver: Driver,
    /// Overrides the user in the URL when set
    pub username: Option<String>,
    /// Overrides the password in the URL when set
    pub password: Option<String>,
    /// When false, work only becomes durable on `Session::commit`
    pub autocommit: bool,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("url", &"[REDACTED]")
            .field("driver", &self.driver)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("autocommit", &self.autocommit)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    pub min_size: u32,
    pub max_size: u32,
    /// Timeout for acquiring a connection from the pool
    pub acquire_timeout_secs: u64,
    /// Timeout for the startup verification query
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min_size: 10,
            max_size: 20,
            acquire_timeout_secs: 10,
            connect_timeout_secs: 5,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

/// SQL logging toggles. Diagnostic only, except that comments are sent with the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SqlLogSettings {
    pub show: bool,
    pub format: bool,
    pub comments: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Label used in logs and pool metrics
    pub name: String,
    pub connection: ConnectionSettings,
    pub pool: PoolSettings,
    pub schema_action: SchemaAction,
    pub audit_enabled: bool,
    pub sql: SqlLogSettings,
}

impl Settings {
    /// Build settings from a property map. Unknown keys are logged and ignored.
    pub fn from_properties(properties: &BTreeMap<String, String>) -> SessionResult<Self> {
        for key in properties.keys() {
            if !keys::ALL.contains(&key.as_str()) {
                warn!(key = %key, "Ignoring unrecognized session factory property");
            }
        }

        let get = |key: &str| properties.get(key).map(|v| v.trim());

        let url = get(keys::CONNECTION_URL)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                SessionError::Configuration(format!("{} is required", keys::CONNECTION_URL))
            })?
            .to_string();
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return Err(SessionError::Configuration(format!(
                "{} must be a postgres:// or postgresql:// URL",
                keys::CONNECTION_URL
            )));
        }

        let driver = match get(keys::CONNECTION_DRIVER) {
            Some(value) => value.parse().map_err(|_| {
                SessionError::Configuration(format!("Unsupported driver {value:?}"))
            })?,
            None => Driver::default(),
        };

        let defaults = PoolSettings::default();
        let pool = PoolSettings {
            min_size: parse_or(properties, keys::POOL_MIN_SIZE, defaults.min_size)?,
            max_size: parse_or(properties, keys::POOL_MAX_SIZE, defaults.max_size)?,
            acquire_timeout_secs: parse_or(
                properties,
                keys::POOL_ACQUIRE_TIMEOUT_SECS,
                defaults.acquire_timeout_secs,
            )?,
            connect_timeout_secs: parse_or(
                properties,
                keys::POOL_CONNECT_TIMEOUT_SECS,
                defaults.connect_timeout_secs,
            )?,
            idle_timeout_secs: parse_or(
                properties,
                keys::POOL_IDLE_TIMEOUT_SECS,
                defaults.idle_timeout_secs,
            )?,
            max_lifetime_secs: parse_or(
                properties,
                keys::POOL_MAX_LIFETIME_SECS,
                defaults.max_lifetime_secs,
            )?,
        };
        if pool.max_size == 0 {
            return Err(SessionError::Configuration(format!(
                "{} must be at least 1",
                keys::POOL_MAX_SIZE
            )));
        }
        if pool.min_size > pool.max_size {
            return Err(SessionError::Configuration(format!(
                "{} ({}) exceeds {} ({})",
                keys::POOL_MIN_SIZE,
                pool.min_size,
                keys::POOL_MAX_SIZE,
                pool.max_size
            )));
        }

        Ok(Self {
            name: get(keys::FACTORY_NAME)
                .filter(|v| !v.is_empty())
                .unwrap_or("default")
                .to_string(),
            connection: ConnectionSettings {
                url,
                driver,
                username: get(keys::CONNECTION_USERNAME).map(str::to_string),
                password: properties.get(keys::CONNECTION_PASSWORD).cloned(),
                autocommit: parse_bool_or(properties, keys::CONNECTION_AUTOCOMMIT, false)?,
            },
            pool,
            schema_action: parse_or(properties, keys::SCHEMA_AUTO, SchemaAction::None)?,
            audit_enabled: parse_bool_or(properties, keys::AUDIT_ENABLED, true)?,
            sql: SqlLogSettings {
                show: parse_bool_or(properties, keys::SQL_SHOW, false)?,
                format: parse_bool_or(properties, keys::SQL_FORMAT, false)?,
                comments: parse_bool_or(properties, keys::SQL_COMMENTS, false)?,
            },
        })
    }

    /// Build settings from `DATABASE_URL` and the `DB_*` variables
    pub fn from_env() -> SessionResult<Self> {
        Self::from_properties(&env::properties_from_env())
    }

    /// Log the effective configuration without credentials
    pub fn log_config(&self) {
        info!(
            factory = %self.name,
            min_size = self.pool.min_size,
            max_size = self.pool.max_size,
            acquire_timeout_secs = self.pool.acquire_timeout_secs,
            connect_timeout_secs = self.pool.connect_timeout_secs,
            schema_action = ?self.schema_action,
            audit_enabled = self.audit_enabled,
            autocommit = self.connection.autocommit,
            "Session factory configuration"
        );
    }
}

fn invalid(key: &str, value: &str) -> SessionError {
    SessionError::InvalidProperty {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_or<T: FromStr>(properties: &BTreeMap<String, String>, key: &str, default: T) -> SessionResult<T> {
    match properties.get(key) {
        Some(value) => value.trim().parse().map_err(|_| invalid(key, value)),
        None => Ok(default),
    }
}

fn parse_bool_or(properties: &BTreeMap<String, String>, key: &str, default: bool) -> SessionResult<bool> {
    match properties.get(key) {
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(invalid(key, value)),
        },
        None => Ok(default),
    }
}
