//! Session factory: a verified pool plus reconciled schema

use std::sync::Arc;

use entity_mapping::Entity;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::SessionResult;
use crate::metrics::spawn_pool_metrics_updater;
use crate::pool::create_pool;
use crate::registry::MetadataRegistry;
use crate::schema;
use crate::session::Session;
use crate::settings::{SchemaAction, Settings};
use crate::sql_log::SqlLogger;

/// State shared by a factory and every session it opened
#[derive(Debug)]
pub(crate) struct FactoryShared {
    pub(crate) settings: Settings,
    pub(crate) registry: MetadataRegistry,
    pub(crate) logger: SqlLogger,
}

/// Builds sessions against one database. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct SessionFactory {
    pool: PgPool,
    shared: Arc<FactoryShared>,
    metrics_task: Option<JoinHandle<()>>,
}

impl SessionFactory {
    /// Connect, verify the connection and apply the schema policy.
    ///
    /// Fails fast: any configuration, connection or schema problem is
    /// returned and no partially built factory is left behind.
    pub async fn build(settings: Settings, registry: MetadataRegistry) -> SessionResult<Self> {
        registry.validate()?;
        settings.log_config();

        let logger = SqlLogger::new(settings.sql);
        let pool = create_pool(&settings).await?;

        if let Err(e) = schema::apply(&pool, &settings, &registry, &logger).await {
            error!(factory = %settings.name, error = %e, "Schema policy failed");
            pool.close().await;
            return Err(e);
        }

        let metrics_task = spawn_pool_metrics_updater(pool.clone(), settings.name.clone());
        info!(
            factory = %settings.name,
            entities = registry.len(),
            schema_action = ?settings.schema_action,
            "Session factory built"
        );

        Ok(Self {
            pool,
            shared: Arc::new(FactoryShared {
                settings,
                registry,
                logger,
            }),
            metrics_task: Some(metrics_task),
        })
    }

    pub fn open_session(&self) -> Session {
        Session::new(self.pool.clone(), Arc::clone(&self.shared))
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    pub fn is_registered<E: Entity>(&self) -> bool {
        self.shared.registry.contains::<E>()
    }

    /// Underlying pool, for statements outside the entity mapping
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool. Under `create-drop`, drops the managed schema first.
    pub async fn close(mut self) -> SessionResult<()> {
        if let Some(task) = self.metrics_task.take() {
            task.abort();
        }
        let shared = &self.shared;
        let result = if shared.settings.schema_action == SchemaAction::CreateDrop {
            schema::drop_schema(
                &self.pool,
                &shared.registry,
                shared.settings.audit_enabled,
                &shared.logger,
            )
            .await
        } else {
            Ok(())
        };
        if let Err(e) = &result {
            warn!(factory = %shared.settings.name, error = %e, "Dropping schema on close failed");
        }
        self.pool.close().await;
        info!(factory = %shared.settings.name, "Session factory closed");
        result
    }
}

impl Drop for SessionFactory {
    fn drop(&mut self) {
        if let Some(task) = self.metrics_task.take() {
            task.abort();
        }
    }
}
