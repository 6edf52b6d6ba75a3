//! Session factory for mapped entities
//!
//! Bootstraps a PostgreSQL-backed persistence layer:
//! - [`Configuration`] collects entity registrations and properties
//! - [`SessionFactory::build`] creates and verifies the pool and applies the schema policy
//! - [`Session`] runs units of work, recording audit history for audited entities
//!
//! Failures surface as [`SessionError`]; nothing here retries.

mod audit;
mod configuration;
mod env;
mod error;
mod factory;
mod metrics;
mod pool;
mod registry;
mod row;
mod schema;
mod session;
mod settings;
mod sql_log;

pub use audit::{Revision, RevisionKind};
pub use configuration::Configuration;
pub use env::{parse_env_optional, properties_from_env, ENV_PROPERTIES};
pub use error::{SessionError, SessionResult};
pub use factory::SessionFactory;
pub use registry::MetadataRegistry;
pub use session::Session;
pub use settings::{
    keys, ConnectionSettings, Driver, PoolSettings, SchemaAction, Settings, SqlLogSettings,
};
pub use sql_log::{format_sql, SqlLogger};
