//! Table schema as exchanged with the warehouse

use serde::{Deserialize, Serialize};

use super::EntityDescriptor;

/// One column of a warehouse table schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Type name as the warehouse reports it (`STRING`, `FLOAT`, `BOOLEAN`, ...)
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl ColumnSchema {
    pub fn new(name: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            mode: None,
        }
    }
}

/// Schema of the staging table, used for the load job.
pub fn staging_schema(entity: &EntityDescriptor) -> Vec<ColumnSchema> {
    entity
        .fields
        .iter()
        .map(|f| ColumnSchema::new(&f.name, f.staging_type().as_str()))
        .collect()
}

/// Schema of the final table, as resolved from metadata.
pub fn final_schema(entity: &EntityDescriptor) -> Vec<ColumnSchema> {
    entity
        .fields
        .iter()
        .map(|f| ColumnSchema {
            name: f.name.clone(),
            field_type: f.warehouse_type.as_str().to_string(),
            mode: (!f.nullable).then(|| "REQUIRED".to_string()),
        })
        .collect()
}
