//! INSERT ... SELECT synthesis from the staging table into the final table.
//!
//! Staging columns hold the OData JSON wire values (strings, except literal
//! booleans). Each final column gets exactly one conversion expression,
//! chosen by its type:
//!
//! - STRING passes through
//! - DATETIME and TIMESTAMP are parsed out of `/Date(<millis>)/` literals
//! - FLOAT64 is a direct cast
//! - BYTES is hex-decoded from an `X'..'` / `binary'..'` literal
//! - anything else is a direct cast to the column's type

use std::collections::HashSet;

use crate::edm::WarehouseType;
use crate::error::IngestError;
use crate::model::{ColumnSchema, TableRef};

use super::identifier::column_ident;

/// Options for conversion expression generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CastOptions {
    /// Emit the historical nested-SELECT BYTES expression byte for byte,
    /// for compatibility with already scheduled jobs.
    pub legacy_bytes_cast: bool,
}

/// Conversion expression for one column, aliased back to its own name.
pub fn conversion_expression(column: &str, type_name: &str, options: CastOptions) -> String {
    let column = column_ident(column);
    match WarehouseType::from_schema_name(type_name) {
        Some(WarehouseType::String) => format!("{c} AS {c}", c = column),
        Some(WarehouseType::Datetime) => format!(
            r#"EXTRACT(DATETIME FROM TIMESTAMP_MILLIS(CAST(REGEXP_EXTRACT({c}, r"/Date\((-?\d+)\)") AS INT64))) AS {c}"#,
            c = column
        ),
        Some(WarehouseType::Timestamp) => format!(
            r#"TIMESTAMP_MILLIS(CAST(REGEXP_EXTRACT({c}, r"/Date\(([-+]?\d+)\+0000\)/") AS INT64)) AS {c}"#,
            c = column
        ),
        Some(WarehouseType::Float64) => format!("CAST({c} AS FLOAT64) AS {c}", c = column),
        Some(WarehouseType::Bytes) if options.legacy_bytes_cast => format!(
            r#"SELECT CAST(cast(REGEXP_EXTRACT({c}, r"[X|binary]'([A-Fa-f0-9][A-Fa-f0-9]*)'") AS BYTES) AS STRING)"#,
            c = column
        ),
        Some(WarehouseType::Bytes) => format!(
            r#"FROM_HEX(REGEXP_EXTRACT({c}, r"(?:X|binary)'([A-Fa-f0-9]+)'")) AS {c}"#,
            c = column
        ),
        Some(other) => format!("CAST({c} AS {t}) AS {c}", c = column, t = other),
        None => format!(
            "CAST({c} AS {t}) AS {c}",
            c = column,
            t = type_name.trim().to_ascii_uppercase()
        ),
    }
}

/// Build the INSERT INTO final SELECT ... FROM staging statement.
///
/// Columns are emitted in the final table's order; each must exist in the
/// staging table.
pub fn create_insert_select(
    final_table: &TableRef,
    final_columns: &[ColumnSchema],
    staging_table: &TableRef,
    staging_columns: &[ColumnSchema],
    options: CastOptions,
) -> Result<String, IngestError> {
    let staged: HashSet<&str> = staging_columns.iter().map(|c| c.name.as_str()).collect();

    let mut target_columns = Vec::with_capacity(final_columns.len());
    let mut select_lines = Vec::with_capacity(final_columns.len());

    for column in final_columns {
        if !staged.contains(column.name.as_str()) {
            return Err(IngestError::MissingStagingColumn {
                column: column.name.clone(),
                final_table: final_table.to_string(),
                staging_table: staging_table.to_string(),
            });
        }
        target_columns.push(format!("  {}", column_ident(&column.name)));
        select_lines.push(format!(
            "  {}",
            conversion_expression(&column.name, &column.field_type, options)
        ));
    }

    Ok(format!(
        "INSERT INTO {} (\n{}\n)\nSELECT\n{}\nFROM {};",
        final_table.sql(),
        target_columns.join(",\n"),
        select_lines.join(",\n"),
        staging_table.sql()
    ))
}
