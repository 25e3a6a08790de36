//! OData metadata parsing

mod edmx_parser;

pub use edmx_parser::{parse_metadata, SAP_NAMESPACE};
