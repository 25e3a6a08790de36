//! MERGE synthesis: upsert today's final-table partition into the refined table

use crate::error::IngestError;
use crate::model::{EntityDescriptor, TableRef};

use super::ddl::INGESTION_DAY_PARTITION;
use super::identifier::column_ident;

/// Join condition over every key, e.g. `source.id=target.id AND ...`
pub fn merge_condition(keys: &[String]) -> String {
    keys.iter()
        .map(|k| format!("source.{k}=target.{k}", k = column_ident(k)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Build the MERGE statement for an entity.
///
/// Rows of the current ingestion day are matched on the entity keys; matched
/// rows get every non-key column updated, unmatched rows are inserted whole.
pub fn create_merge(
    entity: &EntityDescriptor,
    final_table: &TableRef,
    refined_table: &TableRef,
) -> Result<String, IngestError> {
    if entity.keys.is_empty() {
        return Err(IngestError::EmptyKeysError {
            entity: entity.name.clone(),
        });
    }

    let columns: Vec<_> = entity.column_names().map(column_ident).collect();
    let column_list = columns.join(", ");
    let source_values = columns
        .iter()
        .map(|c| format!("source.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = entity
        .non_key_fields()
        .map(|f| format!("target.{c}=source.{c}", c = column_ident(&f.name)))
        .collect::<Vec<_>>();

    let mut lines = vec![
        format!("MERGE INTO {} AS target", refined_table.sql()),
        "USING (".to_string(),
        format!("  SELECT {}", column_list),
        format!("  FROM {}", final_table.sql()),
        format!(
            "  WHERE {} = TIMESTAMP(CURRENT_DATE())",
            INGESTION_DAY_PARTITION
        ),
        ") AS source".to_string(),
        format!("ON {}", merge_condition(&entity.keys)),
    ];

    // An entity made only of key columns has nothing to update
    if !updates.is_empty() {
        lines.push("WHEN MATCHED THEN".to_string());
        lines.push(format!("  UPDATE SET {}", updates.join(", ")));
    }

    lines.push("WHEN NOT MATCHED BY TARGET THEN".to_string());
    lines.push(format!("  INSERT ({})", column_list));
    lines.push(format!("  VALUES ({});", source_values));

    Ok(lines.join("\n"))
}
