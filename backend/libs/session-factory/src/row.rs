//! Binding entity values to statements and decoding rows

use entity_mapping::{hstore, ColumnMapping, ColumnType, ColumnValue, EntityDescriptor};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};

use crate::error::SessionResult;

/// Bind column values in order. Hstore values are bound as text.
pub(crate) fn bind_values<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: Vec<ColumnValue>,
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            ColumnValue::BigInt(v) => query.bind(v),
            ColumnValue::Text(v) => query.bind(v),
            ColumnValue::Hstore(v) => query.bind(v.as_ref().map(hstore::encode_map)),
        };
    }
    query
}

/// Decode the mapped (non-identifier) columns of a row, by column name
pub(crate) fn decode_columns(row: &PgRow, descriptor: &EntityDescriptor) -> SessionResult<Vec<ColumnValue>> {
    descriptor
        .columns
        .iter()
        .map(|column| decode_column(row, column))
        .collect()
}

fn decode_column(row: &PgRow, column: &ColumnMapping) -> SessionResult<ColumnValue> {
    Ok(match column.column_type {
        ColumnType::BigInt => ColumnValue::BigInt(row.try_get(column.column)?),
        ColumnType::Text => ColumnValue::Text(row.try_get(column.column)?),
        ColumnType::Hstore => {
            let raw: Option<String> = row.try_get(column.column)?;
            ColumnValue::Hstore(raw.as_deref().map(hstore::decode_map).transpose()?)
        }
    })
}

/// NULL values for every mapped column, used for deletion audit rows
pub(crate) fn null_values(descriptor: &EntityDescriptor) -> Vec<ColumnValue> {
    descriptor
        .columns
        .iter()
        .map(|column| ColumnValue::null_of(column.column_type))
        .collect()
}
