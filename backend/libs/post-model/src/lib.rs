//! Post entity
//!
//! A post carries a free-form translation table (language code to text)
//! stored in a single `hstore` column. Changes are audited.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use entity_mapping::{
    hash_type_tag, same_identity, ColumnMapping, ColumnType, ColumnValue, ColumnValues, Entity,
    EntityDescriptor, IdGeneration, MappingResult,
};
use serde::{Deserialize, Serialize};

/// Sequence drawing identifiers for posts persisted without one
pub const POST_SEQUENCE: &str = "post_seq";

static POST_COLUMNS: &[ColumnMapping] = &[ColumnMapping {
    field: "translations",
    column: "translations",
    column_type: ColumnType::Hstore,
    nullable: false,
}];

static POST_DESCRIPTOR: EntityDescriptor = EntityDescriptor {
    entity_name: "Post",
    table: "post",
    id: ColumnMapping {
        field: "id",
        column: "id",
        column_type: ColumnType::BigInt,
        nullable: false,
    },
    id_generation: IdGeneration::Sequence(POST_SEQUENCE),
    columns: POST_COLUMNS,
    audited: true,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Post {
    id: Option<i64>,
    translations: BTreeMap<String, String>,
}

impl Post {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Builder-style insert of one translation
    pub fn with_translation(mut self, language: impl Into<String>, text: impl Into<String>) -> Self {
        self.translations.insert(language.into(), text.into());
        self
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn set_id(&mut self, id: Option<i64>) -> &mut Self {
        self.id = id;
        self
    }

    pub fn translations(&self) -> &BTreeMap<String, String> {
        &self.translations
    }

    pub fn translations_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.translations
    }

    pub fn set_translations(&mut self, translations: BTreeMap<String, String>) -> &mut Self {
        self.translations = translations;
        self
    }
}

impl PartialEq for Post {
    fn eq(&self, other: &Self) -> bool {
        same_identity(self, other)
    }
}

impl Hash for Post {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_type_tag::<Self, H>(state);
    }
}

impl Entity for Post {
    fn descriptor() -> &'static EntityDescriptor {
        &POST_DESCRIPTOR
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn column_values(&self) -> Vec<ColumnValue> {
        vec![ColumnValue::Hstore(Some(self.translations.clone()))]
    }

    fn from_column_values(id: i64, values: Vec<ColumnValue>) -> MappingResult<Self> {
        let mut values = ColumnValues::new(Self::descriptor(), values)?;
        Ok(Self {
            id: Some(id),
            translations: values.hstore_not_null()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_maps_post_table() {
        let desc = Post::descriptor();
        assert_eq!(desc.table, "post");
        assert_eq!(desc.id.column, "id");
        assert_eq!(desc.sequence(), Some("post_seq"));
        assert!(desc.audited);

        let column = desc.column("translations").unwrap();
        assert_eq!(column.column_type, ColumnType::Hstore);
        assert!(!column.nullable);
    }

    #[test]
    fn test_column_values_round_trip() {
        let post = Post::with_id(3).with_translation("en", "hello");
        let rebuilt = Post::from_column_values(3, post.column_values()).unwrap();
        assert_eq!(rebuilt.translations(), post.translations());
        assert_eq!(rebuilt.id(), Some(3));
    }

    #[test]
    fn test_fluent_setters_chain() {
        let mut post = Post::new();
        post.set_id(Some(9))
            .set_translations(BTreeMap::from([("de".to_string(), "hallo".to_string())]));
        assert_eq!(post.id(), Some(9));
        assert_eq!(post.translations().get("de").map(String::as_str), Some("hallo"));
    }
}
