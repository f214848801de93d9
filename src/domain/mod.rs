//! The entity graph model: semantic property types, the schema hierarchy and
//! entities built from them.

pub mod entity;
pub mod schema;
pub mod types;

pub use entity::{Entity, EntityData};
pub use schema::{get_schema, Property, Schema};
pub use types::PropertyType;
