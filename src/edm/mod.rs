//! OData type mapping

mod mapping;

pub use mapping::{map_pipeline_type, map_type, EdmType, PipelineType, WarehouseType};
