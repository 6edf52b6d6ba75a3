//! Registered entity metadata

use std::any::TypeId;
use std::collections::HashMap;

use entity_mapping::{Entity, EntityDescriptor};

use crate::error::{SessionError, SessionResult};

/// Entities known to a configuration, in registration order
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    descriptors: Vec<&'static EntityDescriptor>,
    types: HashMap<TypeId, &'static EntityDescriptor>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type. Registering the same type twice is a no-op.
    pub fn add<E: Entity>(&mut self) {
        let descriptor = E::descriptor();
        if self.types.insert(TypeId::of::<E>(), descriptor).is_none() {
            self.descriptors.push(descriptor);
        }
    }

    pub fn contains<E: Entity>(&self) -> bool {
        self.types.contains_key(&TypeId::of::<E>())
    }

    /// Descriptor of a registered entity
    pub fn descriptor<E: Entity>(&self) -> SessionResult<&'static EntityDescriptor> {
        self.types
            .get(&TypeId::of::<E>())
            .copied()
            .ok_or(SessionError::UnknownEntity(E::descriptor().entity_name))
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &'static EntityDescriptor> + '_ {
        self.descriptors.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Reject two entities mapped onto the same table
    pub fn validate(&self) -> SessionResult<()> {
        let mut tables: HashMap<&str, &str> = HashMap::new();
        for descriptor in &self.descriptors {
            if let Some(other) = tables.insert(descriptor.table, descriptor.entity_name) {
                return Err(SessionError::Configuration(format!(
                    "{} and {} both map to table {}",
                    other, descriptor.entity_name, descriptor.table
                )));
            }
        }
        Ok(())
    }
}
