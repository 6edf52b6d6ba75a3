//! The `Entity` trait and identity-based equality helpers

use std::any::TypeId;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::descriptor::{ColumnMapping, ColumnValue, EntityDescriptor};
use crate::error::{MappingError, MappingResult};

/// A type persisted through an [`EntityDescriptor`].
///
/// Implemented by hand next to a `static` descriptor:
///
/// ```ignore
/// static ARTICLE: EntityDescriptor = EntityDescriptor { .. };
///
/// impl Entity for Article {
///     fn descriptor() -> &'static EntityDescriptor { &ARTICLE }
///     fn id(&self) -> Option<i64> { self.id }
///     fn assign_id(&mut self, id: i64) { self.id = Some(id) }
///     fn column_values(&self) -> Vec<ColumnValue> { .. }
///     fn from_column_values(id: i64, values: Vec<ColumnValue>) -> MappingResult<Self> { .. }
/// }
/// ```
pub trait Entity: Send + Sync + Unpin + Sized + 'static {
    /// Static mapping metadata for this type
    fn descriptor() -> &'static EntityDescriptor;

    /// Identifier, `None` until the entity is persisted or assigned
    fn id(&self) -> Option<i64>;

    /// Record the identifier chosen at first persistence
    fn assign_id(&mut self, id: i64);

    /// Values of the non-identifier columns, in descriptor order
    fn column_values(&self) -> Vec<ColumnValue>;

    /// Rebuild an entity from a loaded row
    fn from_column_values(id: i64, values: Vec<ColumnValue>) -> MappingResult<Self>;
}

/// Identity equality shared by all entities.
///
/// The same reference is always equal to itself. Otherwise both sides must
/// resolve to the same concrete type and carry the same assigned identifier;
/// unassigned identifiers never compare equal.
pub fn same_identity<A: Entity, B: Entity>(a: &A, b: &B) -> bool {
    if std::ptr::eq(a as *const A as *const (), b as *const B as *const ()) {
        return true;
    }
    if TypeId::of::<A>() != TypeId::of::<B>() {
        return false;
    }
    matches!((a.id(), b.id()), (Some(x), Some(y)) if x == y)
}

/// Hash an entity by its type tag only.
///
/// Identifiers change on first persistence, so they must stay out of the hash.
pub fn hash_type_tag<E: Entity, H: Hasher>(state: &mut H) {
    E::descriptor().entity_name.hash(state);
}

/// Typed, descriptor-checked access to the values of a loaded row
pub struct ColumnValues {
    descriptor: &'static EntityDescriptor,
    values: std::vec::IntoIter<ColumnValue>,
    index: usize,
}

impl ColumnValues {
    pub fn new(descriptor: &'static EntityDescriptor, values: Vec<ColumnValue>) -> MappingResult<Self> {
        if values.len() != descriptor.columns.len() {
            return Err(MappingError::ColumnCount {
                entity: descriptor.entity_name,
                expected: descriptor.columns.len(),
                found: values.len(),
            });
        }
        Ok(Self {
            descriptor,
            values: values.into_iter(),
            index: 0,
        })
    }

    fn next_value(&mut self) -> MappingResult<(&'static ColumnMapping, ColumnValue)> {
        let mapping = self
            .descriptor
            .columns
            .get(self.index)
            .ok_or(MappingError::ColumnCount {
                entity: self.descriptor.entity_name,
                expected: self.descriptor.columns.len(),
                found: self.index + 1,
            })?;
        let value = self.values.next().ok_or(MappingError::ColumnCount {
            entity: self.descriptor.entity_name,
            expected: self.descriptor.columns.len(),
            found: self.index,
        })?;
        self.index += 1;

        if value.column_type() != mapping.column_type {
            return Err(MappingError::TypeMismatch {
                entity: self.descriptor.entity_name,
                column: mapping.column,
                expected: mapping.column_type.describe(),
            });
        }
        Ok((mapping, value))
    }

    fn required<T>(&self, mapping: &ColumnMapping, value: Option<T>) -> MappingResult<T> {
        value.ok_or(MappingError::UnexpectedNull {
            entity: self.descriptor.entity_name,
            column: mapping.column,
        })
    }

    pub fn bigint(&mut self) -> MappingResult<Option<i64>> {
        match self.next_value()? {
            (_, ColumnValue::BigInt(v)) => Ok(v),
            (mapping, _) => Err(self.mismatch(mapping)),
        }
    }

    pub fn text(&mut self) -> MappingResult<Option<String>> {
        match self.next_value()? {
            (_, ColumnValue::Text(v)) => Ok(v),
            (mapping, _) => Err(self.mismatch(mapping)),
        }
    }

    pub fn hstore(&mut self) -> MappingResult<Option<BTreeMap<String, String>>> {
        match self.next_value()? {
            (_, ColumnValue::Hstore(v)) => Ok(v),
            (mapping, _) => Err(self.mismatch(mapping)),
        }
    }

    /// Next hstore value, rejecting NULL
    pub fn hstore_not_null(&mut self) -> MappingResult<BTreeMap<String, String>> {
        match self.next_value()? {
            (mapping, ColumnValue::Hstore(v)) => self.required(mapping, v),
            (mapping, _) => Err(self.mismatch(mapping)),
        }
    }

    fn mismatch(&self, mapping: &'static ColumnMapping) -> MappingError {
        MappingError::TypeMismatch {
            entity: self.descriptor.entity_name,
            column: mapping.column,
            expected: mapping.column_type.describe(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ColumnType, IdGeneration};

    static NOTE_COLUMNS: &[ColumnMapping] = &[ColumnMapping {
        field: "tags",
        column: "tags",
        column_type: ColumnType::Hstore,
        nullable: false,
    }];

    static NOTE: EntityDescriptor = EntityDescriptor {
        entity_name: "Note",
        table: "note",
        id: ColumnMapping {
            field: "id",
            column: "id",
            column_type: ColumnType::BigInt,
            nullable: false,
        },
        id_generation: IdGeneration::Assigned,
        columns: NOTE_COLUMNS,
        audited: false,
    };

    #[derive(Debug, Default)]
    struct Note {
        id: Option<i64>,
        tags: BTreeMap<String, String>,
    }

    impl Entity for Note {
        fn descriptor() -> &'static EntityDescriptor {
            &NOTE
        }
        fn id(&self) -> Option<i64> {
            self.id
        }
        fn assign_id(&mut self, id: i64) {
            self.id = Some(id);
        }
        fn column_values(&self) -> Vec<ColumnValue> {
            vec![ColumnValue::Hstore(Some(self.tags.clone()))]
        }
        fn from_column_values(id: i64, values: Vec<ColumnValue>) -> MappingResult<Self> {
            let mut values = ColumnValues::new(Self::descriptor(), values)?;
            Ok(Self {
                id: Some(id),
                tags: values.hstore_not_null()?,
            })
        }
    }

    // Same shape as Note, distinct type.
    #[derive(Debug, Default)]
    struct Memo {
        id: Option<i64>,
    }

    impl Entity for Memo {
        fn descriptor() -> &'static EntityDescriptor {
            &NOTE
        }
        fn id(&self) -> Option<i64> {
            self.id
        }
        fn assign_id(&mut self, id: i64) {
            self.id = Some(id);
        }
        fn column_values(&self) -> Vec<ColumnValue> {
            vec![ColumnValue::Hstore(Some(BTreeMap::new()))]
        }
        fn from_column_values(id: i64, _values: Vec<ColumnValue>) -> MappingResult<Self> {
            Ok(Self { id: Some(id) })
        }
    }

    #[test]
    fn test_same_reference_is_equal_even_without_id() {
        let note = Note::default();
        assert!(same_identity(&note, &note));
    }

    #[test]
    fn test_unassigned_ids_never_equal() {
        assert!(!same_identity(&Note::default(), &Note::default()));
    }

    #[test]
    fn test_different_types_with_same_id_are_not_equal() {
        let note = Note {
            id: Some(7),
            ..Default::default()
        };
        let memo = Memo { id: Some(7) };
        assert!(!same_identity(&note, &memo));
    }

    #[test]
    fn test_from_column_values_rejects_wrong_count() {
        let err = Note::from_column_values(1, vec![]).unwrap_err();
        assert_eq!(
            err,
            MappingError::ColumnCount {
                entity: "Note",
                expected: 1,
                found: 0
            }
        );
    }

    #[test]
    fn test_from_column_values_rejects_wrong_type() {
        let err = Note::from_column_values(1, vec![ColumnValue::Text(Some("x".into()))]).unwrap_err();
        assert!(matches!(err, MappingError::TypeMismatch { column: "tags", .. }));
    }

    #[test]
    fn test_from_column_values_rejects_null_map() {
        let err = Note::from_column_values(1, vec![ColumnValue::Hstore(None)]).unwrap_err();
        assert_eq!(
            err,
            MappingError::UnexpectedNull {
                entity: "Note",
                column: "tags"
            }
        );
    }

    #[test]
    fn test_reading_past_last_column_is_count_error() {
        let mut values =
            ColumnValues::new(&NOTE, vec![ColumnValue::Hstore(Some(BTreeMap::new()))]).unwrap();
        assert!(values.hstore_not_null().unwrap().is_empty());
        assert_eq!(
            values.hstore_not_null().unwrap_err(),
            MappingError::ColumnCount {
                entity: "Note",
                expected: 1,
                found: 2
            }
        );
    }
}
