//! Schema-update policy
//!
//! Reconciles the live schema with the registered descriptors when a factory
//! is built. Everything a policy run changes happens in one transaction.

use std::collections::HashMap;

use entity_mapping::{sql, ColumnMapping, EntityDescriptor};
use sqlx::{PgConnection, PgPool, Row};
use tracing::{debug, info};

use crate::error::{SessionError, SessionResult};
use crate::registry::MetadataRegistry;
use crate::settings::{SchemaAction, Settings};
use crate::sql_log::SqlLogger;

/// Live definition of one column
#[derive(Debug, Clone, PartialEq, Eq)]
struct LiveColumn {
    udt_name: String,
    nullable: bool,
}

/// column name -> live definition
type TableColumns = HashMap<String, LiveColumn>;

pub(crate) async fn apply(
    pool: &PgPool,
    settings: &Settings,
    registry: &MetadataRegistry,
    logger: &SqlLogger,
) -> SessionResult<()> {
    let audit = settings.audit_enabled;
    debug!(action = ?settings.schema_action, "Applying schema policy");

    match settings.schema_action {
        SchemaAction::None => Ok(()),
        SchemaAction::Validate => {
            let mut conn = pool.acquire().await?;
            check_extensions(&mut *conn, registry).await?;
            validate(&mut *conn, registry, audit).await
        }
        SchemaAction::Update => {
            let mut tx = pool.begin().await?;
            check_extensions(&mut *tx, registry).await?;
            update(&mut *tx, registry, audit, logger).await?;
            tx.commit().await?;
            Ok(())
        }
        SchemaAction::Create | SchemaAction::CreateDrop => {
            let mut tx = pool.begin().await?;
            check_extensions(&mut *tx, registry).await?;
            drop_all(&mut *tx, registry, audit, logger).await?;
            update(&mut *tx, registry, audit, logger).await?;
            tx.commit().await?;
            Ok(())
        }
    }
}

/// Drop every managed table and sequence (used on close under `create-drop`)
pub(crate) async fn drop_schema(
    pool: &PgPool,
    registry: &MetadataRegistry,
    audit: bool,
    logger: &SqlLogger,
) -> SessionResult<()> {
    let mut tx = pool.begin().await?;
    drop_all(&mut *tx, registry, audit, logger).await?;
    tx.commit().await?;
    Ok(())
}

async fn execute(conn: &mut PgConnection, logger: &SqlLogger, stmt: String) -> SessionResult<()> {
    logger.log(&stmt);
    sqlx::query(&stmt).execute(&mut *conn).await?;
    Ok(())
}

async fn table_columns(conn: &mut PgConnection, table: &str) -> SessionResult<TableColumns> {
    let rows = sqlx::query(sql::select_table_columns())
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;
    rows.iter()
        .map(|row| -> SessionResult<(String, LiveColumn)> {
            let name: String = row.try_get("column_name")?;
            let udt_name: String = row.try_get("udt_name")?;
            let is_nullable: String = row.try_get("is_nullable")?;
            Ok((
                name,
                LiveColumn {
                    udt_name,
                    nullable: is_nullable == "YES",
                },
            ))
        })
        .collect()
}

async fn check_extensions(conn: &mut PgConnection, registry: &MetadataRegistry) -> SessionResult<()> {
    if !registry.descriptors().any(|d| d.uses_hstore()) {
        return Ok(());
    }
    let installed: bool = sqlx::query_scalar(sql::type_exists())
        .bind("hstore")
        .fetch_one(&mut *conn)
        .await?;
    if installed {
        Ok(())
    } else {
        Err(SessionError::Schema(
            "type hstore is not installed; run CREATE EXTENSION hstore".to_string(),
        ))
    }
}

/// Audit tables keep every mapped column nullable, so `enforce_not_null`
/// is only set for entity tables.
fn check_column(
    table: &str,
    existing: &TableColumns,
    column: &ColumnMapping,
    enforce_not_null: bool,
) -> SessionResult<()> {
    match existing.get(column.column) {
        None => Err(SessionError::Schema(format!(
            "missing column {}.{}",
            table, column.column
        ))),
        Some(live) if live.udt_name != column.column_type.udt_name() => {
            Err(SessionError::Schema(format!(
                "column {}.{} has type {}, expected {}",
                table,
                column.column,
                live.udt_name,
                column.column_type.udt_name()
            )))
        }
        Some(live) if enforce_not_null && !column.nullable && live.nullable => {
            Err(SessionError::Schema(format!(
                "column {}.{} is nullable, expected NOT NULL",
                table, column.column
            )))
        }
        Some(_) => Ok(()),
    }
}

fn audits(descriptor: &EntityDescriptor, audit: bool) -> bool {
    audit && descriptor.audited
}

async fn validate(conn: &mut PgConnection, registry: &MetadataRegistry, audit: bool) -> SessionResult<()> {
    for descriptor in registry.descriptors() {
        let existing = table_columns(conn, descriptor.table).await?;
        if existing.is_empty() {
            return Err(SessionError::Schema(format!("missing table {}", descriptor.table)));
        }
        check_column(descriptor.table, &existing, &descriptor.id, true)?;
        for column in descriptor.columns {
            check_column(descriptor.table, &existing, column, true)?;
        }

        if audits(descriptor, audit) {
            let audit_table = descriptor.audit_table();
            let existing = table_columns(conn, &audit_table).await?;
            if existing.is_empty() {
                return Err(SessionError::Schema(format!("missing table {audit_table}")));
            }
            for column in descriptor.columns {
                check_column(&audit_table, &existing, column, false)?;
            }
        }
    }

    if registry.descriptors().any(|d| audits(d, audit))
        && table_columns(conn, sql::REVINFO_TABLE).await?.is_empty()
    {
        return Err(SessionError::Schema(format!(
            "missing table {}",
            sql::REVINFO_TABLE
        )));
    }

    info!(entities = registry.len(), "Schema validated");
    Ok(())
}

async fn update(
    conn: &mut PgConnection,
    registry: &MetadataRegistry,
    audit: bool,
    logger: &SqlLogger,
) -> SessionResult<()> {
    if registry.descriptors().any(|d| audits(d, audit)) {
        execute(conn, logger, sql::create_revinfo()).await?;
    }

    for descriptor in registry.descriptors() {
        if let Some(sequence) = descriptor.sequence() {
            execute(conn, logger, sql::create_sequence(sequence)).await?;
        }

        let existing = table_columns(conn, descriptor.table).await?;
        if existing.is_empty() {
            execute(conn, logger, sql::create_table(descriptor)).await?;
            info!(table = descriptor.table, "Created table");
        } else {
            for column in descriptor.columns {
                if !existing.contains_key(column.column) {
                    execute(conn, logger, sql::add_column(descriptor.table, column)).await?;
                    info!(table = descriptor.table, column = column.column, "Added column");
                }
            }
        }

        if audits(descriptor, audit) {
            let audit_table = descriptor.audit_table();
            let existing = table_columns(conn, &audit_table).await?;
            if existing.is_empty() {
                execute(conn, logger, sql::create_audit_table(descriptor)).await?;
                info!(table = %audit_table, "Created audit table");
            } else {
                for column in descriptor.columns {
                    if !existing.contains_key(column.column) {
                        execute(conn, logger, sql::add_audit_column(descriptor, column)).await?;
                        info!(table = %audit_table, column = column.column, "Added audit column");
                    }
                }
            }
        }
    }
    Ok(())
}

async fn drop_all(
    conn: &mut PgConnection,
    registry: &MetadataRegistry,
    audit: bool,
    logger: &SqlLogger,
) -> SessionResult<()> {
    let descriptors: Vec<_> = registry.descriptors().collect();
    for descriptor in descriptors.iter().rev() {
        if audits(descriptor, audit) {
            execute(conn, logger, sql::drop_table(&descriptor.audit_table())).await?;
        }
        execute(conn, logger, sql::drop_table(descriptor.table)).await?;
        if let Some(sequence) = descriptor.sequence() {
            execute(conn, logger, sql::drop_sequence(sequence)).await?;
        }
    }
    if descriptors.iter().any(|d| audits(d, audit)) {
        execute(conn, logger, sql::drop_table(sql::REVINFO_TABLE)).await?;
    }
    info!(entities = descriptors.len(), "Dropped managed schema");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_mapping::ColumnType;

    const TRANSLATIONS: ColumnMapping = ColumnMapping {
        field: "translations",
        column: "translations",
        column_type: ColumnType::Hstore,
        nullable: false,
    };

    fn columns(defs: &[(&str, &str, bool)]) -> TableColumns {
        defs.iter()
            .map(|(c, t, nullable)| {
                (
                    c.to_string(),
                    LiveColumn {
                        udt_name: t.to_string(),
                        nullable: *nullable,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_check_column_accepts_matching_type() {
        let existing = columns(&[("translations", "hstore", false)]);
        assert!(check_column("post", &existing, &TRANSLATIONS, true).is_ok());
    }

    #[test]
    fn test_check_column_reports_missing() {
        let err = check_column("post", &columns(&[]), &TRANSLATIONS, true).unwrap_err();
        assert_eq!(err.to_string(), "Schema error: missing column post.translations");
    }

    #[test]
    fn test_check_column_reports_nullable_column() {
        let existing = columns(&[("translations", "hstore", true)]);
        let err = check_column("post", &existing, &TRANSLATIONS, true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Schema error: column post.translations is nullable, expected NOT NULL"
        );
    }

    #[test]
    fn test_check_column_allows_nullable_audit_column() {
        let existing = columns(&[("translations", "hstore", true)]);
        assert!(check_column("post_aud", &existing, &TRANSLATIONS, false).is_ok());
    }

    #[test]
    fn test_check_column_reports_type_mismatch() {
        let existing = columns(&[("translations", "text", false)]);
        let err = check_column("post", &existing, &TRANSLATIONS, true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Schema error: column post.translations has type text, expected hstore"
        );
    }
}
