//! Downstream data-pipeline description

mod cdap;

pub use cdap::{
    build_pipeline, incremental_filter, load_template, modification_field, record_schema,
    select_list, upsert_keys, PipelineSettings, BASE_TEMPLATE, RECORD_NAME,
};
