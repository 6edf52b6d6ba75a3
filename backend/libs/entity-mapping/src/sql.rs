//! SQL statements generated from an [`EntityDescriptor`]
//!
//! Parameter order for row statements is always the identifier first,
//! followed by the mapped columns in descriptor order.

use crate::descriptor::{ColumnMapping, EntityDescriptor};

/// Table grouping audit rows written by one unit of work
pub const REVINFO_TABLE: &str = "revinfo";

/// Revision kinds stored in `<table>_aud.revtype`
pub const REVTYPE_ADD: i16 = 0;
pub const REVTYPE_MOD: i16 = 1;
pub const REVTYPE_DEL: i16 = 2;

fn placeholder(index: usize, column: &ColumnMapping) -> String {
    match column.column_type.bind_cast() {
        Some(cast) => format!("${index}::{cast}"),
        None => format!("${index}"),
    }
}

fn column_list(desc: &EntityDescriptor) -> String {
    std::iter::once(desc.id.column)
        .chain(desc.columns.iter().map(|c| c.column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn select_list(desc: &EntityDescriptor) -> String {
    std::iter::once(desc.id.column.to_string())
        .chain(desc.columns.iter().map(ColumnMapping::select_expr))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_definition(column: &ColumnMapping) -> String {
    if column.nullable {
        format!("{} {}", column.column, column.column_type.sql_type())
    } else {
        format!(
            "{} {} NOT NULL DEFAULT {}",
            column.column,
            column.column_type.sql_type(),
            column.column_type.empty_default()
        )
    }
}

pub fn insert(desc: &EntityDescriptor) -> String {
    let values = std::iter::once("$1".to_string())
        .chain(
            desc.columns
                .iter()
                .enumerate()
                .map(|(i, c)| placeholder(i + 2, c)),
        )
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        desc.table,
        column_list(desc),
        values
    )
}

pub fn update(desc: &EntityDescriptor) -> String {
    let assignments = desc
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = {}", c.column, placeholder(i + 2, c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {} = $1",
        desc.table, assignments, desc.id.column
    )
}

pub fn select_by_id(desc: &EntityDescriptor) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1",
        select_list(desc),
        desc.table,
        desc.id.column
    )
}

pub fn delete(desc: &EntityDescriptor) -> String {
    format!("DELETE FROM {} WHERE {} = $1", desc.table, desc.id.column)
}

pub fn next_id(sequence: &str) -> String {
    format!("SELECT nextval('{sequence}')")
}

/// Move the sequence past an application-assigned identifier ($1) so later
/// `nextval` calls cannot hand it out again. Never moves the sequence back.
pub fn advance_sequence(sequence: &str) -> String {
    format!(
        "SELECT setval('{sequence}', $1) FROM {sequence} \
         WHERE $1 > CASE WHEN is_called THEN last_value ELSE last_value - 1 END"
    )
}

pub fn create_sequence(sequence: &str) -> String {
    format!("CREATE SEQUENCE IF NOT EXISTS {sequence}")
}

pub fn drop_sequence(sequence: &str) -> String {
    format!("DROP SEQUENCE IF EXISTS {sequence}")
}

pub fn create_table(desc: &EntityDescriptor) -> String {
    let mut parts = vec![format!(
        "{} {} NOT NULL",
        desc.id.column,
        desc.id.column_type.sql_type()
    )];
    parts.extend(desc.columns.iter().map(column_definition));
    parts.push(format!("PRIMARY KEY ({})", desc.id.column));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        desc.table,
        parts.join(", ")
    )
}

pub fn add_column(table: &str, column: &ColumnMapping) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
        table,
        column_definition(column)
    )
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {table} CASCADE")
}

/// Columns of a table in the current schema: `column_name`, `udt_name`, `is_nullable`
pub fn select_table_columns() -> &'static str {
    "SELECT column_name::text AS column_name, udt_name::text AS udt_name, is_nullable::text AS is_nullable \
     FROM information_schema.columns \
     WHERE table_schema = current_schema() AND table_name = $1"
}

/// Whether a type with the given name is installed
pub fn type_exists() -> &'static str {
    "SELECT EXISTS (SELECT 1 FROM pg_type WHERE typname = $1)"
}

pub fn create_revinfo() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {REVINFO_TABLE} (rev BIGSERIAL PRIMARY KEY, revtstmp BIGINT NOT NULL)"
    )
}

pub fn insert_revision() -> String {
    format!("INSERT INTO {REVINFO_TABLE} (revtstmp) VALUES ($1) RETURNING rev")
}

/// Audit columns are all nullable: deletions record NULL state.
pub fn create_audit_table(desc: &EntityDescriptor) -> String {
    let mut parts = vec![
        format!("{} {} NOT NULL", desc.id.column, desc.id.column_type.sql_type()),
        format!("rev BIGINT NOT NULL REFERENCES {REVINFO_TABLE} (rev)"),
        "revtype SMALLINT NOT NULL".to_string(),
    ];
    parts.extend(
        desc.columns
            .iter()
            .map(|c| format!("{} {}", c.column, c.column_type.sql_type())),
    );
    parts.push(format!("PRIMARY KEY ({}, rev)", desc.id.column));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        desc.audit_table(),
        parts.join(", ")
    )
}

/// Audit column definition used when evolving an existing audit table
pub fn add_audit_column(desc: &EntityDescriptor, column: &ColumnMapping) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
        desc.audit_table(),
        column.column,
        column.column_type.sql_type()
    )
}

/// Parameters: id, rev, revtype, then mapped columns
pub fn insert_audit(desc: &EntityDescriptor) -> String {
    let columns = std::iter::once(desc.id.column)
        .chain(["rev", "revtype"])
        .chain(desc.columns.iter().map(|c| c.column))
        .collect::<Vec<_>>()
        .join(", ");
    let values = ["$1".to_string(), "$2".to_string(), "$3".to_string()]
        .into_iter()
        .chain(
            desc.columns
                .iter()
                .enumerate()
                .map(|(i, c)| placeholder(i + 4, c)),
        )
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        desc.audit_table(),
        columns,
        values
    )
}

/// Overwrite the audit row of one revision. Parameters as in [`insert_audit`].
pub fn update_audit(desc: &EntityDescriptor) -> String {
    let assignments = std::iter::once("revtype = $3".to_string())
        .chain(
            desc.columns
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{} = {}", c.column, placeholder(i + 4, c))),
        )
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "UPDATE {} SET {} WHERE {} = $1 AND rev = $2",
        desc.audit_table(),
        assignments,
        desc.id.column
    )
}

/// Parameters: id, rev
pub fn delete_audit(desc: &EntityDescriptor) -> String {
    format!(
        "DELETE FROM {} WHERE {} = $1 AND rev = $2",
        desc.audit_table(),
        desc.id.column
    )
}

/// History of one entity, oldest revision first
pub fn select_history(desc: &EntityDescriptor) -> String {
    let columns = desc
        .columns
        .iter()
        .map(|c| format!("a.{}", c.select_expr()))
        .collect::<Vec<_>>();
    let mut select = vec![
        "a.rev".to_string(),
        "a.revtype".to_string(),
        "r.revtstmp".to_string(),
    ];
    select.extend(columns);
    format!(
        "SELECT {} FROM {} a JOIN {REVINFO_TABLE} r ON r.rev = a.rev WHERE a.{} = $1 ORDER BY a.rev",
        select.join(", "),
        desc.audit_table(),
        desc.id.column
    )
}
