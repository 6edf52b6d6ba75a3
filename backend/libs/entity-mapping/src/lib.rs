//! Entity mapping primitives
//!
//! Declares how a Rust type maps onto a PostgreSQL table through a static
//! [`EntityDescriptor`] instead of runtime metadata discovery, and generates
//! the SQL a session needs to load, store, and audit it.

mod descriptor;
mod entity;
mod error;
pub mod hstore;
pub mod sql;

pub use descriptor::{ColumnMapping, ColumnType, ColumnValue, EntityDescriptor, IdGeneration};
pub use entity::{hash_type_tag, same_identity, ColumnValues, Entity};
pub use error::{MappingError, MappingResult};
