//! Environment variable sources for factory properties
//!
//! Each variable maps onto one property key, so environment-driven and
//! programmatic configuration go through the same parser.

use std::collections::BTreeMap;

use crate::settings::keys;

/// Environment variable → property key
pub const ENV_PROPERTIES: &[(&str, &str)] = &[
    ("DATABASE_URL", keys::CONNECTION_URL),
    ("DB_DRIVER", keys::CONNECTION_DRIVER),
    ("DB_USERNAME", keys::CONNECTION_USERNAME),
    ("DB_PASSWORD", keys::CONNECTION_PASSWORD),
    ("DB_AUTOCOMMIT", keys::CONNECTION_AUTOCOMMIT),
    ("DB_MIN_CONNECTIONS", keys::POOL_MIN_SIZE),
    ("DB_MAX_CONNECTIONS", keys::POOL_MAX_SIZE),
    ("DB_ACQUIRE_TIMEOUT_SECS", keys::POOL_ACQUIRE_TIMEOUT_SECS),
    ("DB_CONNECT_TIMEOUT_SECS", keys::POOL_CONNECT_TIMEOUT_SECS),
    ("DB_IDLE_TIMEOUT_SECS", keys::POOL_IDLE_TIMEOUT_SECS),
    ("DB_MAX_LIFETIME_SECS", keys::POOL_MAX_LIFETIME_SECS),
    ("DB_SCHEMA_AUTO", keys::SCHEMA_AUTO),
    ("DB_AUDIT_ENABLED", keys::AUDIT_ENABLED),
    ("DB_SHOW_SQL", keys::SQL_SHOW),
    ("DB_FORMAT_SQL", keys::SQL_FORMAT),
    ("DB_SQL_COMMENTS", keys::SQL_COMMENTS),
];

/// Parse an environment variable, returning None if missing or invalid
pub fn parse_env_optional<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Collect every mapped variable that is set
pub fn properties_from_env() -> BTreeMap<String, String> {
    ENV_PROPERTIES
        .iter()
        .filter_map(|(var, key)| {
            parse_env_optional::<String>(var).map(|value| (key.to_string(), value))
        })
        .collect()
}
