//! OData primitive types and their warehouse / pipeline counterparts
//!
//! Mappings follow the SuccessFactors OData v2 type documentation:
//! https://www.odata.org/documentation/odata-version-2-0/overview/

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::IngestError;

/// OData (EDM) primitive type, as found in a `Property/@Type` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EdmType {
    #[serde(rename = "Edm.Binary")]
    Binary,
    #[serde(rename = "Edm.Boolean")]
    Boolean,
    #[serde(rename = "Edm.Byte")]
    Byte,
    #[serde(rename = "Edm.DateTime")]
    DateTime,
    #[serde(rename = "Edm.DateTimeOffset")]
    DateTimeOffset,
    #[serde(rename = "Edm.Decimal")]
    Decimal,
    #[serde(rename = "Edm.Double")]
    Double,
    #[serde(rename = "Edm.Float")]
    Float,
    #[serde(rename = "Edm.Guid")]
    Guid,
    #[serde(rename = "Edm.Int16")]
    Int16,
    #[serde(rename = "Edm.Int32")]
    Int32,
    #[serde(rename = "Edm.Int64")]
    Int64,
    #[serde(rename = "Edm.SByte")]
    SByte,
    #[serde(rename = "Edm.Single")]
    Single,
    #[serde(rename = "Edm.String")]
    String,
    #[serde(rename = "Edm.Time")]
    Time,
}

impl EdmType {
    pub const ALL: [EdmType; 16] = [
        EdmType::Binary,
        EdmType::Boolean,
        EdmType::Byte,
        EdmType::DateTime,
        EdmType::DateTimeOffset,
        EdmType::Decimal,
        EdmType::Double,
        EdmType::Float,
        EdmType::Guid,
        EdmType::Int16,
        EdmType::Int32,
        EdmType::Int64,
        EdmType::SByte,
        EdmType::Single,
        EdmType::String,
        EdmType::Time,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdmType::Binary => "Edm.Binary",
            EdmType::Boolean => "Edm.Boolean",
            EdmType::Byte => "Edm.Byte",
            EdmType::DateTime => "Edm.DateTime",
            EdmType::DateTimeOffset => "Edm.DateTimeOffset",
            EdmType::Decimal => "Edm.Decimal",
            EdmType::Double => "Edm.Double",
            EdmType::Float => "Edm.Float",
            EdmType::Guid => "Edm.Guid",
            EdmType::Int16 => "Edm.Int16",
            EdmType::Int32 => "Edm.Int32",
            EdmType::Int64 => "Edm.Int64",
            EdmType::SByte => "Edm.SByte",
            EdmType::Single => "Edm.Single",
            EdmType::String => "Edm.String",
            EdmType::Time => "Edm.Time",
        }
    }

    /// Column type used in warehouse DDL
    pub fn warehouse_type(&self) -> WarehouseType {
        match self {
            EdmType::Binary => WarehouseType::Bytes,
            EdmType::Boolean => WarehouseType::Bool,
            EdmType::DateTime => WarehouseType::Datetime,
            EdmType::Time | EdmType::DateTimeOffset => WarehouseType::Timestamp,
            EdmType::Int64 | EdmType::Int32 | EdmType::Int16 | EdmType::Byte | EdmType::SByte => {
                WarehouseType::Integer
            }
            EdmType::Decimal => WarehouseType::Decimal,
            EdmType::Double | EdmType::Float | EdmType::Single => WarehouseType::Float64,
            EdmType::Guid | EdmType::String => WarehouseType::String,
        }
    }

    /// Type used in the columnar record schema of the pipeline description
    pub fn pipeline_type(&self) -> PipelineType {
        match self {
            EdmType::SByte | EdmType::Int16 | EdmType::Int32 => PipelineType::Scalar("int"),
            // SuccessFactors connectors expose Edm.Byte as raw bytes
            EdmType::Byte | EdmType::Binary => PipelineType::Scalar("bytes"),
            EdmType::Int64 => PipelineType::Scalar("long"),
            EdmType::Double => PipelineType::Scalar("double"),
            EdmType::Float | EdmType::Single => PipelineType::Scalar("float"),
            EdmType::Decimal => PipelineType::Logical {
                base: "bytes",
                logical_type: "decimal",
                precision: Some(15),
                scale: Some(2),
            },
            EdmType::String | EdmType::Guid => PipelineType::Scalar("string"),
            EdmType::Boolean => PipelineType::Scalar("boolean"),
            EdmType::DateTime => PipelineType::Logical {
                base: "string",
                logical_type: "datetime",
                precision: None,
                scale: None,
            },
            EdmType::Time => PipelineType::Logical {
                base: "long",
                logical_type: "time-micros",
                precision: None,
                scale: None,
            },
            EdmType::DateTimeOffset => PipelineType::Logical {
                base: "long",
                logical_type: "timestamp-micros",
                precision: None,
                scale: None,
            },
        }
    }
}

impl FromStr for EdmType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdmType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| IngestError::UnsupportedTypeError {
                type_name: s.to_string(),
                field: None,
            })
    }
}

impl fmt::Display for EdmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warehouse (BigQuery) column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WarehouseType {
    Bytes,
    Bool,
    Datetime,
    Timestamp,
    Integer,
    Decimal,
    Float64,
    String,
}

impl WarehouseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarehouseType::Bytes => "BYTES",
            WarehouseType::Bool => "BOOL",
            WarehouseType::Datetime => "DATETIME",
            WarehouseType::Timestamp => "TIMESTAMP",
            WarehouseType::Integer => "INTEGER",
            WarehouseType::Decimal => "DECIMAL",
            WarehouseType::Float64 => "FLOAT64",
            WarehouseType::String => "STRING",
        }
    }

    /// Resolve a type name as reported by the warehouse table API.
    ///
    /// Table metadata uses legacy names (`FLOAT`, `BOOLEAN`, `NUMERIC`) while
    /// DDL uses standard ones; both resolve to the same type.
    pub fn from_schema_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "BYTES" => Some(WarehouseType::Bytes),
            "BOOL" | "BOOLEAN" => Some(WarehouseType::Bool),
            "DATETIME" => Some(WarehouseType::Datetime),
            "TIMESTAMP" => Some(WarehouseType::Timestamp),
            "INTEGER" | "INT64" => Some(WarehouseType::Integer),
            "DECIMAL" | "NUMERIC" => Some(WarehouseType::Decimal),
            "FLOAT" | "FLOAT64" => Some(WarehouseType::Float64),
            "STRING" => Some(WarehouseType::String),
            _ => None,
        }
    }

    /// Type of the column in the all-string staging table
    pub fn staging_type(&self) -> WarehouseType {
        match self {
            WarehouseType::Bool => WarehouseType::Bool,
            _ => WarehouseType::String,
        }
    }
}

impl fmt::Display for WarehouseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column type in the pipeline description's record schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineType {
    Scalar(&'static str),
    Logical {
        base: &'static str,
        logical_type: &'static str,
        precision: Option<u32>,
        scale: Option<u32>,
    },
}

impl Serialize for PipelineType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        match self {
            PipelineType::Scalar(name) => serializer.serialize_str(name),
            PipelineType::Logical {
                base,
                logical_type,
                precision,
                scale,
            } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("type", base)?;
                map.serialize_entry("logicalType", logical_type)?;
                if let Some(precision) = precision {
                    map.serialize_entry("precision", precision)?;
                }
                if let Some(scale) = scale {
                    map.serialize_entry("scale", scale)?;
                }
                map.end()
            }
        }
    }
}

/// Map an OData type name to its warehouse column type.
pub fn map_type(source_type: &str) -> Result<WarehouseType, IngestError> {
    source_type.parse::<EdmType>().map(|t| t.warehouse_type())
}

/// Map an OData type name to its pipeline record-schema type.
pub fn map_pipeline_type(source_type: &str) -> Result<PipelineType, IngestError> {
    source_type.parse::<EdmType>().map(|t| t.pipeline_type())
}
