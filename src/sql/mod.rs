//! SQL synthesis from an entity descriptor

mod cast;
mod ddl;
mod identifier;
mod merge;

pub use cast::{conversion_expression, create_insert_select, CastOptions};
pub use ddl::{
    create_final_table, create_refined_table, create_staging_table, INGESTION_DAY_PARTITION,
    MAX_CLUSTERING_COLUMNS,
};
pub use identifier::{
    column_ident, escape_string_literal, is_reserved_keyword, quote_string_literal,
    validate_identifier,
};
pub use merge::{create_merge, merge_condition};
