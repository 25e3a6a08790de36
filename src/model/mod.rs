//! Entity model

mod entity;
mod schema;
mod tables;

pub use entity::{column_description, EntityDescriptor, FieldDescriptor};
pub use schema::{final_schema, staging_schema, ColumnSchema};
pub use tables::{DatasetRef, EntityTables, TableRef, STAGING_TABLE_PREFIX};
