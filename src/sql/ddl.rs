//! CREATE TABLE synthesis for the staging, final and refined tables

use crate::error::IngestError;
use crate::model::{EntityDescriptor, FieldDescriptor, TableRef};

use super::identifier::{column_ident, quote_string_literal};

/// Maximum number of clustering columns the warehouse accepts
pub const MAX_CLUSTERING_COLUMNS: usize = 4;

/// Partition expression of the final table (ingestion time, daily)
pub const INGESTION_DAY_PARTITION: &str = "TIMESTAMP_TRUNC(_PARTITIONTIME, DAY)";

/// Staging table DDL: every column is STRING except booleans.
pub fn create_staging_table(entity: &EntityDescriptor, table: &TableRef) -> String {
    let columns: Vec<String> = entity
        .fields
        .iter()
        .map(|f| format!("  {} {}", column_ident(&f.name), f.staging_type()))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        table.sql(),
        columns.join(",\n")
    )
}

/// Final table DDL: typed, documented, partitioned by ingestion day.
pub fn create_final_table(
    entity: &EntityDescriptor,
    table: &TableRef,
) -> Result<String, IngestError> {
    create_typed_table(entity, table, true)
}

/// Refined table DDL: typed and documented, clustered but not partitioned.
pub fn create_refined_table(
    entity: &EntityDescriptor,
    table: &TableRef,
) -> Result<String, IngestError> {
    create_typed_table(entity, table, false)
}

fn create_typed_table(
    entity: &EntityDescriptor,
    table: &TableRef,
    partition_by_day: bool,
) -> Result<String, IngestError> {
    if entity.keys.is_empty() {
        return Err(IngestError::EmptyKeysError {
            entity: entity.name.clone(),
        });
    }
    if entity.keys.len() > MAX_CLUSTERING_COLUMNS {
        return Err(IngestError::TooManyClusteringColumns {
            table: table.to_string(),
            count: entity.keys.len(),
            max: MAX_CLUSTERING_COLUMNS,
        });
    }

    let columns: Vec<String> = entity.fields.iter().map(typed_column).collect();
    let clustering: Vec<_> = entity.keys.iter().map(|k| column_ident(k)).collect();

    let mut lines = vec![
        format!("CREATE TABLE IF NOT EXISTS {} (", table.sql()),
        columns.join(",\n"),
        ")".to_string(),
    ];
    if partition_by_day {
        lines.push(format!("PARTITION BY {}", INGESTION_DAY_PARTITION));
    }
    lines.push(format!("CLUSTER BY {}", clustering.join(", ")));
    lines.push(format!(
        "OPTIONS(description={});",
        quote_string_literal(&entity.description)
    ));

    Ok(lines.join("\n"))
}

fn typed_column(field: &FieldDescriptor) -> String {
    let mode = if field.nullable { "" } else { " NOT NULL" };
    format!(
        "  {} {}{} OPTIONS(description={})",
        column_ident(&field.name),
        field.warehouse_type,
        mode,
        quote_string_literal(&field.description)
    )
}
