//! Change history for audited entities
//!
//! Every unit of work that changes at least one audited entity gets one
//! `revinfo` row. Each change appends a row to `<table>_aud` inside the same
//! transaction as the primary write, so history commits or rolls back with it.

use chrono::{DateTime, Utc};
use entity_mapping::{sql, ColumnValue, Entity, EntityDescriptor};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, Row};
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::row::{bind_values, decode_columns};
use crate::sql_log::SqlLogger;

/// What a revision did to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionKind {
    Add,
    Modify,
    Delete,
}

impl RevisionKind {
    pub fn code(self) -> i16 {
        match self {
            Self::Add => sql::REVTYPE_ADD,
            Self::Modify => sql::REVTYPE_MOD,
            Self::Delete => sql::REVTYPE_DEL,
        }
    }

    /// Kind of the single audit row left when `next` follows `self` on the
    /// same entity within one revision. `None` means the changes cancel out
    /// and no row remains.
    pub fn merge(self, next: RevisionKind) -> Option<RevisionKind> {
        match (self, next) {
            (Self::Add, Self::Delete) => None,
            (Self::Add, _) => Some(Self::Add),
            (Self::Delete, Self::Add) | (Self::Delete, Self::Modify) => Some(Self::Modify),
            (_, Self::Delete) => Some(Self::Delete),
            (Self::Modify, _) => Some(Self::Modify),
        }
    }

    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            sql::REVTYPE_ADD => Some(Self::Add),
            sql::REVTYPE_MOD => Some(Self::Modify),
            sql::REVTYPE_DEL => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One historical state of an entity
#[derive(Debug, Clone, Serialize)]
pub struct Revision<E> {
    /// Revision number, shared by every change in the same unit of work
    pub rev: i64,
    pub kind: RevisionKind,
    pub timestamp: DateTime<Utc>,
    /// State after the change, `None` for deletions
    pub entity: Option<E>,
}

/// Open a new revision and return its number
pub(crate) async fn new_revision(conn: &mut PgConnection, logger: &SqlLogger) -> SessionResult<i64> {
    let stmt = logger.prepare("revision", "RevInfo", &sql::insert_revision());
    logger.log(&stmt);
    let rev: i64 = sqlx::query_scalar(&stmt)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&mut *conn)
        .await?;
    debug!(rev, "Opened audit revision");
    Ok(rev)
}

pub(crate) async fn record(
    conn: &mut PgConnection,
    logger: &SqlLogger,
    descriptor: &EntityDescriptor,
    id: i64,
    rev: i64,
    kind: RevisionKind,
    values: Vec<ColumnValue>,
) -> SessionResult<()> {
    let stmt = logger.prepare("audit", descriptor.entity_name, &sql::insert_audit(descriptor));
    logger.log(&stmt);
    let query = sqlx::query(&stmt).bind(id).bind(rev).bind(kind.code());
    bind_values(query, values).execute(&mut *conn).await?;
    debug!(
        entity = descriptor.entity_name,
        id,
        rev,
        kind = ?kind,
        "Recorded audit row"
    );
    Ok(())
}

/// Replace the audit row already written for `(id, rev)`
pub(crate) async fn rewrite(
    conn: &mut PgConnection,
    logger: &SqlLogger,
    descriptor: &EntityDescriptor,
    id: i64,
    rev: i64,
    kind: RevisionKind,
    values: Vec<ColumnValue>,
) -> SessionResult<()> {
    let stmt = logger.prepare("audit", descriptor.entity_name, &sql::update_audit(descriptor));
    logger.log(&stmt);
    let query = sqlx::query(&stmt).bind(id).bind(rev).bind(kind.code());
    bind_values(query, values).execute(&mut *conn).await?;
    debug!(
        entity = descriptor.entity_name,
        id,
        rev,
        kind = ?kind,
        "Merged audit row"
    );
    Ok(())
}

/// Remove the audit row for `(id, rev)`
pub(crate) async fn discard(
    conn: &mut PgConnection,
    logger: &SqlLogger,
    descriptor: &EntityDescriptor,
    id: i64,
    rev: i64,
) -> SessionResult<()> {
    let stmt = logger.prepare("audit", descriptor.entity_name, &sql::delete_audit(descriptor));
    logger.log(&stmt);
    sqlx::query(&stmt).bind(id).bind(rev).execute(&mut *conn).await?;
    debug!(entity = descriptor.entity_name, id, rev, "Discarded audit row");
    Ok(())
}

/// History of one entity, oldest first
pub(crate) async fn load_history<E: Entity>(
    conn: &mut PgConnection,
    logger: &SqlLogger,
    id: i64,
) -> SessionResult<Vec<Revision<E>>> {
    let descriptor = E::descriptor();
    let stmt = logger.prepare("history", descriptor.entity_name, &sql::select_history(descriptor));
    logger.log(&stmt);
    let rows = sqlx::query(&stmt).bind(id).fetch_all(&mut *conn).await?;

    let mut revisions = Vec::with_capacity(rows.len());
    for row in rows {
        let rev: i64 = row.try_get("rev")?;
        let code: i16 = row.try_get("revtype")?;
        let millis: i64 = row.try_get("revtstmp")?;
        let kind = RevisionKind::from_code(code).ok_or_else(|| {
            SessionError::Schema(format!(
                "{} revision {} has unknown revtype {}",
                descriptor.audit_table(),
                rev,
                code
            ))
        })?;
        let entity = match kind {
            RevisionKind::Delete => None,
            _ => Some(E::from_column_values(id, decode_columns(&row, descriptor)?)?),
        };
        revisions.push(Revision {
            rev,
            kind,
            timestamp: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
            entity,
        });
    }
    Ok(revisions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_codes_round_trip() {
        for kind in [RevisionKind::Add, RevisionKind::Modify, RevisionKind::Delete] {
            assert_eq!(RevisionKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(RevisionKind::Add.code(), 0);
        assert_eq!(RevisionKind::Modify.code(), 1);
        assert_eq!(RevisionKind::Delete.code(), 2);
        assert_eq!(RevisionKind::from_code(7), None);
    }

    #[test]
    fn test_merge_keeps_one_row_per_revision() {
        use RevisionKind::*;
        assert_eq!(Add.merge(Modify), Some(Add));
        assert_eq!(Add.merge(Delete), None);
        assert_eq!(Modify.merge(Modify), Some(Modify));
        assert_eq!(Modify.merge(Delete), Some(Delete));
        assert_eq!(Delete.merge(Add), Some(Modify));
        assert_eq!(Delete.merge(Delete), Some(Delete));
    }
}
