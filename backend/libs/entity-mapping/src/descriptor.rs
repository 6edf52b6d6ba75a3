//! Static descriptors mapping entity fields onto table columns

use std::collections::BTreeMap;

/// Storage encoding of a mapped column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 64-bit integer (`BIGINT`)
    BigInt,
    /// Unbounded text (`TEXT`)
    Text,
    /// Key-value store column (`hstore` extension type)
    Hstore,
}

impl ColumnType {
    /// Type name used in DDL
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::BigInt => "BIGINT",
            Self::Text => "TEXT",
            Self::Hstore => "hstore",
        }
    }

    /// Type name reported by `information_schema.columns.udt_name`
    pub fn udt_name(&self) -> &'static str {
        match self {
            Self::BigInt => "int8",
            Self::Text => "text",
            Self::Hstore => "hstore",
        }
    }

    /// Cast applied to a bound parameter.
    ///
    /// Hstore values travel over the wire in their text form.
    pub fn bind_cast(&self) -> Option<&'static str> {
        match self {
            Self::Hstore => Some("hstore"),
            _ => None,
        }
    }

    /// Default expression for a non-nullable column added to an existing table
    pub fn empty_default(&self) -> &'static str {
        match self {
            Self::BigInt => "0",
            Self::Text => "''",
            Self::Hstore => "''::hstore",
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Self::BigInt => "bigint",
            Self::Text => "text",
            Self::Hstore => "hstore",
        }
    }
}

/// One field-to-column mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMapping {
    /// Field name on the Rust entity
    pub field: &'static str,
    /// Column name in the table
    pub column: &'static str,
    /// Storage encoding
    pub column_type: ColumnType,
    /// Whether the column accepts NULL
    pub nullable: bool,
}

impl ColumnMapping {
    /// Expression used to read the column back.
    ///
    /// Hstore columns are selected as text and decoded client-side.
    pub fn select_expr(&self) -> String {
        match self.column_type {
            ColumnType::Hstore => format!("{col}::text AS {col}", col = self.column),
            _ => self.column.to_string(),
        }
    }
}

/// How identifiers are assigned on first persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdGeneration {
    /// The application sets the identifier before persisting
    Assigned,
    /// Identifiers without a value are drawn from the named sequence
    Sequence(&'static str),
}

/// Describes how one entity type maps to one table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDescriptor {
    /// Entity name used in logs, errors, and as the type tag for hashing
    pub entity_name: &'static str,
    /// Backing table
    pub table: &'static str,
    /// Identifier column (always a `BigInt`)
    pub id: ColumnMapping,
    /// Identifier assignment strategy
    pub id_generation: IdGeneration,
    /// Non-identifier columns, in the order `Entity::column_values` yields them
    pub columns: &'static [ColumnMapping],
    /// Whether changes are recorded in the audit table
    pub audited: bool,
}

impl EntityDescriptor {
    /// Name of the shadow table holding change history
    pub fn audit_table(&self) -> String {
        format!("{}_aud", self.table)
    }

    /// Look up a column mapping by field name
    pub fn column(&self, field: &str) -> Option<&ColumnMapping> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Sequence backing identifier generation, if any
    pub fn sequence(&self) -> Option<&'static str> {
        match self.id_generation {
            IdGeneration::Sequence(name) => Some(name),
            IdGeneration::Assigned => None,
        }
    }

    /// Whether any column needs the hstore extension
    pub fn uses_hstore(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.column_type == ColumnType::Hstore)
    }
}

/// A single column value moving between an entity and a row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    BigInt(Option<i64>),
    Text(Option<String>),
    Hstore(Option<BTreeMap<String, String>>),
}

impl ColumnValue {
    /// NULL of the given column type
    pub fn null_of(column_type: ColumnType) -> Self {
        match column_type {
            ColumnType::BigInt => Self::BigInt(None),
            ColumnType::Text => Self::Text(None),
            ColumnType::Hstore => Self::Hstore(None),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::BigInt(_) => ColumnType::BigInt,
            Self::Text(_) => ColumnType::Text,
            Self::Hstore(_) => ColumnType::Hstore,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::BigInt(v) => v.is_none(),
            Self::Text(v) => v.is_none(),
            Self::Hstore(v) => v.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLUMNS: &[ColumnMapping] = &[
        ColumnMapping {
            field: "title",
            column: "title",
            column_type: ColumnType::Text,
            nullable: true,
        },
        ColumnMapping {
            field: "labels",
            column: "labels",
            column_type: ColumnType::Hstore,
            nullable: false,
        },
    ];

    const DESCRIPTOR: EntityDescriptor = EntityDescriptor {
        entity_name: "Article",
        table: "article",
        id: ColumnMapping {
            field: "id",
            column: "id",
            column_type: ColumnType::BigInt,
            nullable: false,
        },
        id_generation: IdGeneration::Sequence("article_seq"),
        columns: COLUMNS,
        audited: true,
    };

    #[test]
    fn test_audit_table_name() {
        assert_eq!(DESCRIPTOR.audit_table(), "article_aud");
    }

    #[test]
    fn test_column_lookup_by_field() {
        assert_eq!(DESCRIPTOR.column("labels").map(|c| c.column), Some("labels"));
        assert!(DESCRIPTOR.column("missing").is_none());
    }

    #[test]
    fn test_hstore_columns_select_as_text() {
        assert_eq!(COLUMNS[0].select_expr(), "title");
        assert_eq!(COLUMNS[1].select_expr(), "labels::text AS labels");
        assert!(DESCRIPTOR.uses_hstore());
    }

    #[test]
    fn test_null_of_matches_type() {
        for ty in [ColumnType::BigInt, ColumnType::Text, ColumnType::Hstore] {
            let value = ColumnValue::null_of(ty);
            assert!(value.is_null());
            assert_eq!(value.column_type(), ty);
        }
    }
}
