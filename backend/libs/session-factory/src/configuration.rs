//! Programmatic configuration: entity registrations plus a property map

use std::collections::BTreeMap;
use std::fmt;

use entity_mapping::Entity;

use crate::env;
use crate::error::SessionResult;
use crate::factory::SessionFactory;
use crate::registry::MetadataRegistry;
use crate::settings::{keys, Settings};

/// Collects entities and properties, then builds a [`SessionFactory`].
///
/// ```ignore
/// let factory = Configuration::new()
///     .add_entity::<Post>()
///     .set_property(keys::CONNECTION_URL, "postgres://localhost:5432/postgres")
///     .set_property(keys::SCHEMA_AUTO, "update")
///     .build_session_factory()
///     .await?;
/// ```
#[derive(Clone, Default)]
pub struct Configuration {
    registry: MetadataRegistry,
    properties: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entity<E: Entity>(mut self) -> Self {
        self.registry.add::<E>();
        self
    }

    /// Set a property, replacing any previous value
    pub fn set_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Fill unset properties from `DATABASE_URL` and the `DB_*` variables.
    /// Explicitly set properties win.
    pub fn with_env(mut self) -> Self {
        for (key, value) in env::properties_from_env() {
            self.properties.entry(key).or_insert(value);
        }
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    /// Parse and validate the properties without connecting
    pub fn settings(&self) -> SessionResult<Settings> {
        Settings::from_properties(&self.properties)
    }

    pub async fn build_session_factory(self) -> SessionResult<SessionFactory> {
        let settings = self.settings()?;
        SessionFactory::build(settings, self.registry).await
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let properties: BTreeMap<&str, &str> = self
            .properties
            .iter()
            .map(|(k, v)| {
                let shown = match k.as_str() {
                    keys::CONNECTION_URL | keys::CONNECTION_PASSWORD => "[REDACTED]",
                    _ => v.as_str(),
                };
                (k.as_str(), shown)
            })
            .collect();
        f.debug_struct("Configuration")
            .field("registry", &self.registry)
            .field("properties", &properties)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SchemaAction;
    use post_model::Post;
    use serial_test::serial;

    fn configuration() -> Configuration {
        Configuration::new()
            .add_entity::<Post>()
            .set_property(keys::CONNECTION_URL, "postgres://localhost:5432/postgres")
            .set_property(keys::CONNECTION_USERNAME, "postgres")
            .set_property(keys::CONNECTION_PASSWORD, "postgres")
            .set_property(keys::SCHEMA_AUTO, "update")
    }

    #[test]
    fn test_builder_collects_entities_and_properties() {
        let config = configuration();
        assert!(config.registry().contains::<Post>());
        assert_eq!(config.registry().len(), 1);
        assert_eq!(config.property(keys::SCHEMA_AUTO), Some("update"));
        assert_eq!(config.property(keys::SQL_SHOW), None);
    }

    #[test]
    fn test_set_property_replaces() {
        let config = configuration().set_property(keys::SCHEMA_AUTO, "validate");
        assert_eq!(
            config.settings().unwrap().schema_action,
            SchemaAction::Validate
        );
    }

    #[test]
    fn test_debug_redacts_url_and_password() {
        let debug = format!("{:?}", configuration());
        assert!(!debug.contains("localhost:5432"));
        assert!(debug.contains("[REDACTED]"));
        assert!(debug.contains("update"));
    }

    #[tokio::test]
    async fn test_invalid_configuration_fails_before_connecting() {
        let err = configuration()
            .set_property(keys::POOL_MAX_SIZE, "0")
            .build_session_factory()
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    #[serial]
    fn test_env_fills_only_unset_keys() {
        for (var, _) in env::ENV_PROPERTIES {
            std::env::remove_var(var);
        }
        std::env::set_var("DATABASE_URL", "postgres://elsewhere:5432/other");
        std::env::set_var("DB_SHOW_SQL", "true");

        let config = configuration().with_env();
        assert_eq!(
            config.property(keys::CONNECTION_URL),
            Some("postgres://localhost:5432/postgres")
        );
        assert_eq!(config.property(keys::SQL_SHOW), Some("true"));

        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("DB_SHOW_SQL");
    }
}
