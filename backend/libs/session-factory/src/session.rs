//! Units of work against the database
//!
//! A `Session` owns at most one open transaction. The transaction starts
//! lazily with the first statement. With autocommit off, changes become
//! durable only on [`Session::commit`]; dropping the session rolls them back.
//! With autocommit on, every operation commits (or rolls back) on its own.

use std::collections::HashMap;
use std::sync::Arc;

use entity_mapping::{sql, Entity, EntityDescriptor, IdGeneration};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use crate::audit::{self, Revision, RevisionKind};
use crate::error::{SessionError, SessionResult};
use crate::factory::FactoryShared;
use crate::metrics::begin_with_metrics;
use crate::row::{bind_values, decode_columns, null_values};

pub struct Session {
    pool: PgPool,
    shared: Arc<FactoryShared>,
    tx: Option<Transaction<'static, Postgres>>,
    /// Audit revision opened by the current unit of work
    revision: Option<i64>,
    /// Audit row kind written so far in this revision, per (table, id)
    audited: HashMap<(&'static str, i64), RevisionKind>,
}

impl Session {
    pub(crate) fn new(pool: PgPool, shared: Arc<FactoryShared>) -> Self {
        Self {
            pool,
            shared,
            tx: None,
            revision: None,
            audited: HashMap::new(),
        }
    }

    /// Whether a unit of work is open
    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    /// Insert a new entity. Assigns its identifier from the entity's sequence
    /// when it has none.
    pub async fn persist<E: Entity>(&mut self, entity: &mut E) -> SessionResult<()> {
        let result = self.persist_inner(entity).await;
        self.finish(result).await
    }

    /// Load an entity by identifier
    pub async fn find<E: Entity>(&mut self, id: i64) -> SessionResult<Option<E>> {
        let result = self.find_inner(id).await;
        self.finish(result).await
    }

    /// Write the entity's current state over its stored row
    pub async fn merge<E: Entity>(&mut self, entity: &E) -> SessionResult<()> {
        let result = self.merge_inner(entity).await;
        self.finish(result).await
    }

    /// Delete the entity's stored row
    pub async fn remove<E: Entity>(&mut self, entity: &E) -> SessionResult<()> {
        let result = self.remove_inner(entity).await;
        self.finish(result).await
    }

    /// Audited history of one entity, oldest revision first
    pub async fn history<E: Entity>(&mut self, id: i64) -> SessionResult<Vec<Revision<E>>> {
        let result = self.history_inner(id).await;
        self.finish(result).await
    }

    /// Make the current unit of work durable
    pub async fn commit(mut self) -> SessionResult<()> {
        self.end_revision();
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
            debug!(factory = %self.shared.settings.name, "Unit of work committed");
        }
        Ok(())
    }

    /// Discard the current unit of work
    pub async fn rollback(mut self) -> SessionResult<()> {
        self.end_revision();
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!(factory = %self.shared.settings.name, "Unit of work rolled back");
        }
        Ok(())
    }

    async fn persist_inner<E: Entity>(&mut self, entity: &mut E) -> SessionResult<()> {
        let descriptor = self.shared.registry.descriptor::<E>()?;
        if entity.id().is_none() && descriptor.id_generation == IdGeneration::Assigned {
            return Err(SessionError::MissingIdentifier {
                entity: descriptor.entity_name,
            });
        }
        let logger = self.shared.logger;
        let values = entity.column_values();
        let tx = self.unit_of_work().await?;

        let id = match (entity.id(), descriptor.sequence()) {
            (Some(id), Some(sequence)) => {
                let stmt = logger.prepare(
                    "advance sequence",
                    descriptor.entity_name,
                    &sql::advance_sequence(sequence),
                );
                logger.log(&stmt);
                sqlx::query(&stmt).bind(id).execute(&mut **tx).await?;
                id
            }
            (Some(id), None) => id,
            (None, Some(sequence)) => {
                let stmt = logger.prepare("next id", descriptor.entity_name, &sql::next_id(sequence));
                logger.log(&stmt);
                sqlx::query_scalar::<_, i64>(&stmt)
                    .fetch_one(&mut **tx)
                    .await?
            }
            (None, None) => {
                return Err(SessionError::MissingIdentifier {
                    entity: descriptor.entity_name,
                })
            }
        };

        let stmt = logger.prepare("insert", descriptor.entity_name, &sql::insert(descriptor));
        logger.log(&stmt);
        bind_values(sqlx::query(&stmt).bind(id), values.clone())
            .execute(&mut **tx)
            .await
            .map_err(|e| duplicate_or_database(e, descriptor, id))?;

        self.audit(descriptor, id, RevisionKind::Add, values).await?;
        entity.assign_id(id);
        debug!(entity = descriptor.entity_name, id, "Persisted entity");
        Ok(())
    }

    async fn find_inner<E: Entity>(&mut self, id: i64) -> SessionResult<Option<E>> {
        let descriptor = self.shared.registry.descriptor::<E>()?;
        let logger = self.shared.logger;
        let stmt = logger.prepare("load", descriptor.entity_name, &sql::select_by_id(descriptor));
        logger.log(&stmt);

        let tx = self.unit_of_work().await?;
        let row = sqlx::query(&stmt).bind(id).fetch_optional(&mut **tx).await?;
        match row {
            Some(row) => Ok(Some(E::from_column_values(id, decode_columns(&row, descriptor)?)?)),
            None => Ok(None),
        }
    }

    async fn merge_inner<E: Entity>(&mut self, entity: &E) -> SessionResult<()> {
        let descriptor = self.shared.registry.descriptor::<E>()?;
        let id = entity.id().ok_or(SessionError::Transient {
            entity: descriptor.entity_name,
        })?;
        let logger = self.shared.logger;
        let values = entity.column_values();
        let stmt = logger.prepare("update", descriptor.entity_name, &sql::update(descriptor));
        logger.log(&stmt);

        let tx = self.unit_of_work().await?;
        let result = bind_values(sqlx::query(&stmt).bind(id), values.clone())
            .execute(&mut **tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(SessionError::EntityNotFound {
                entity: descriptor.entity_name,
                id,
            });
        }

        self.audit(descriptor, id, RevisionKind::Modify, values).await?;
        debug!(entity = descriptor.entity_name, id, "Merged entity");
        Ok(())
    }

    async fn remove_inner<E: Entity>(&mut self, entity: &E) -> SessionResult<()> {
        let descriptor = self.shared.registry.descriptor::<E>()?;
        let id = entity.id().ok_or(SessionError::Transient {
            entity: descriptor.entity_name,
        })?;
        let logger = self.shared.logger;
        let stmt = logger.prepare("delete", descriptor.entity_name, &sql::delete(descriptor));
        logger.log(&stmt);

        let tx = self.unit_of_work().await?;
        let result = sqlx::query(&stmt).bind(id).execute(&mut **tx).await?;
        if result.rows_affected() == 0 {
            return Err(SessionError::EntityNotFound {
                entity: descriptor.entity_name,
                id,
            });
        }

        self.audit(descriptor, id, RevisionKind::Delete, null_values(descriptor))
            .await?;
        debug!(entity = descriptor.entity_name, id, "Removed entity");
        Ok(())
    }

    async fn history_inner<E: Entity>(&mut self, id: i64) -> SessionResult<Vec<Revision<E>>> {
        let descriptor = self.shared.registry.descriptor::<E>()?;
        if !(self.shared.settings.audit_enabled && descriptor.audited) {
            return Err(SessionError::Configuration(format!(
                "{} is not audited by this session factory",
                descriptor.entity_name
            )));
        }
        let logger = self.shared.logger;
        let tx = self.unit_of_work().await?;
        audit::load_history::<E>(&mut **tx, &logger, id).await
    }

    async fn audit(
        &mut self,
        descriptor: &'static EntityDescriptor,
        id: i64,
        kind: RevisionKind,
        values: Vec<entity_mapping::ColumnValue>,
    ) -> SessionResult<()> {
        if !(self.shared.settings.audit_enabled && descriptor.audited) {
            return Ok(());
        }
        let logger = self.shared.logger;
        let rev = match self.revision {
            Some(rev) => rev,
            None => {
                let tx = self.unit_of_work().await?;
                let rev = audit::new_revision(&mut **tx, &logger).await?;
                self.revision = Some(rev);
                rev
            }
        };
        let key = (descriptor.table, id);
        let prior = self.audited.get(&key).copied();
        let tx = self.unit_of_work().await?;
        match prior {
            None => {
                audit::record(&mut **tx, &logger, descriptor, id, rev, kind, values).await?;
                self.audited.insert(key, kind);
            }
            Some(prior) => match prior.merge(kind) {
                Some(merged) => {
                    audit::rewrite(&mut **tx, &logger, descriptor, id, rev, merged, values)
                        .await?;
                    self.audited.insert(key, merged);
                }
                None => {
                    audit::discard(&mut **tx, &logger, descriptor, id, rev).await?;
                    self.audited.remove(&key);
                }
            },
        }
        Ok(())
    }

    fn end_revision(&mut self) {
        self.revision = None;
        self.audited.clear();
    }

    async fn unit_of_work(&mut self) -> SessionResult<&mut Transaction<'static, Postgres>> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => {
                let tx = begin_with_metrics(&self.pool, &self.shared.settings.name).await?;
                debug!(factory = %self.shared.settings.name, "Unit of work started");
                tx
            }
        };
        Ok(self.tx.insert(tx))
    }

    /// Under autocommit, end the unit of work after every operation
    async fn finish<T>(&mut self, result: SessionResult<T>) -> SessionResult<T> {
        if !self.shared.settings.connection.autocommit {
            return result;
        }
        self.end_revision();
        let tx = self.tx.take();
        match (result, tx) {
            (Ok(value), Some(tx)) => {
                tx.commit().await?;
                Ok(value)
            }
            (Ok(value), None) => Ok(value),
            (Err(e), Some(tx)) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback after failed operation failed");
                }
                Err(e)
            }
            (Err(e), None) => Err(e),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!(
                factory = %self.shared.settings.name,
                "Session dropped with an open unit of work; rolling back"
            );
        }
    }
}

fn duplicate_or_database(err: sqlx::Error, descriptor: &EntityDescriptor, id: i64) -> SessionError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => SessionError::DuplicateIdentifier {
            entity: descriptor.entity_name,
            id,
        },
        _ => SessionError::Database(err),
    }
}
