//! Data-pipeline description for incremental SuccessFactors extraction
//!
//! A template document is filled in with the entity's record schema, the
//! source stage's select list and incremental filter, and the sink stage's
//! upsert keys and destination.

use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::{json, Value};

use crate::edm::PipelineType;
use crate::error::IngestError;
use crate::model::EntityDescriptor;

/// Built-in template, used unless a path is configured
pub const BASE_TEMPLATE: &str = include_str!("../../templates/base_pipeline.json");

/// Name of the record in the pipeline schema
pub const RECORD_NAME: &str = "SuccessFactorsColumnMetadata";

const SOURCE_STAGE_NAME: &str = "SAP SuccessFactors";
const SCHEMA_BODY_NAME: &str = "etlSchemaBody";

/// Modification-time fields, in order of preference
const MODIFIED_FIELDS: [&str; 2] = ["lastModifiedDateTime", "lastModifiedOn"];

const FILTER_TEMPLATE: &str = "{field} ge datetime'${logicalStartTime(yyyy-MM-dd,1d)}T00:00:00' \
and {field} le datetime'${logicalStartTime(yyyy-MM-dd'T'HH:mm:ss)}'";

const SOURCE_PROPERTIES: &str = "/config/stages/0/plugin/properties";
const SINK_PROPERTIES: &str = "/config/stages/1/plugin/properties";

/// Destination and connection settings for the description
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Connection reference of the SuccessFactors source
    pub connection_id: String,
    /// Connection reference of the warehouse sink
    pub sink_connection: String,
    /// Bucket the sink stages temporary files in
    pub temp_bucket: String,
    pub dataset: String,
    pub location: String,
}

#[derive(Serialize)]
#[serde(untagged)]
enum FieldType {
    Required(PipelineType),
    Nullable((PipelineType, &'static str)),
}

#[derive(Serialize)]
struct RecordField<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    field_type: FieldType,
}

#[derive(Serialize)]
struct RecordSchema<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    fields: Vec<RecordField<'a>>,
}

/// The record schema as a JSON string; nullable fields become `[type, "null"]`.
pub fn record_schema(entity: &EntityDescriptor) -> String {
    let fields = entity
        .fields
        .iter()
        .map(|f| RecordField {
            name: &f.name,
            field_type: if f.nullable {
                FieldType::Nullable((f.source_type.pipeline_type(), "null"))
            } else {
                FieldType::Required(f.source_type.pipeline_type())
            },
        })
        .collect();

    let schema = RecordSchema {
        kind: "record",
        name: RECORD_NAME,
        fields,
    };
    // Only strings and integers reach the serializer
    serde_json::to_string(&schema).unwrap_or_default()
}

/// The field used to select rows changed since the last run.
pub fn modification_field(entity: &EntityDescriptor) -> &'static str {
    MODIFIED_FIELDS
        .iter()
        .copied()
        .find(|f| entity.has_field(f))
        .unwrap_or(MODIFIED_FIELDS[1])
}

/// OData `$filter` covering the previous logical day up to the run start.
pub fn incremental_filter(entity: &EntityDescriptor) -> String {
    FILTER_TEMPLATE.replace("{field}", modification_field(entity))
}

/// Entity keys followed by the modification-time field, comma-separated.
pub fn upsert_keys(entity: &EntityDescriptor) -> String {
    let mut keys: Vec<&str> = entity.keys.iter().map(String::as_str).collect();
    let modified = modification_field(entity);
    if !keys.contains(&modified) {
        keys.push(modified);
    }
    keys.join(",")
}

pub fn select_list(entity: &EntityDescriptor) -> String {
    entity.column_names().collect::<Vec<_>>().join(",")
}

/// Read the template from `path`, or fall back to the built-in one.
pub fn load_template(path: Option<&Path>) -> Result<Value, IngestError> {
    let (text, origin) = match path {
        Some(path) => (
            fs::read_to_string(path).map_err(|e| IngestError::LocalReadError {
                path: path.to_path_buf(),
                source: e,
            })?,
            path.display().to_string(),
        ),
        None => (BASE_TEMPLATE.to_string(), "built-in template".to_string()),
    };
    serde_json::from_str(&text).map_err(|e| IngestError::PipelineTemplateError {
        pointer: format!("valid JSON in {} ({})", origin, e),
    })
}

/// Set `pointer` to `value`; the parent object must already exist.
fn set(document: &mut Value, pointer: &str, value: Value) -> Result<(), IngestError> {
    let missing = || IngestError::PipelineTemplateError {
        pointer: pointer.to_string(),
    };
    let (parent, key) = pointer.rsplit_once('/').ok_or_else(missing)?;
    let target = document
        .pointer_mut(parent)
        .and_then(Value::as_object_mut)
        .ok_or_else(missing)?;
    target.insert(key.to_string(), value);
    Ok(())
}

/// Fill the template for one entity.
pub fn build_pipeline(
    entity: &EntityDescriptor,
    mut template: Value,
    settings: &PipelineSettings,
) -> Result<Value, IngestError> {
    let schema = record_schema(entity);
    let output_schema = json!([{ "name": SCHEMA_BODY_NAME, "schema": schema }]);
    let input_schema = json!([{ "name": SOURCE_STAGE_NAME, "schema": schema }]);

    let doc = &mut template;
    set(doc, "/name", json!(format!("{}_SuccessFactors", entity.name)))?;

    let source = [
        ("referenceName", json!(entity.name)),
        ("entityName", json!(entity.name)),
        ("schema", json!(schema)),
        ("connection", json!(settings.connection_id)),
        ("filterOption", json!(incremental_filter(entity))),
        ("selectOption", json!(select_list(entity))),
    ];
    for (key, value) in source {
        set(doc, &format!("{}/{}", SOURCE_PROPERTIES, key), value)?;
    }
    set(doc, "/config/stages/0/outputSchema", output_schema.clone())?;

    let sink = [
        ("table", json!(entity.name)),
        ("relationTableKey", json!(upsert_keys(entity))),
        ("connection", json!(settings.sink_connection)),
        ("schema", json!(schema)),
        ("bucket", json!(settings.temp_bucket)),
        ("dataset", json!(settings.dataset)),
        ("location", json!(settings.location)),
    ];
    for (key, value) in sink {
        set(doc, &format!("{}/{}", SINK_PROPERTIES, key), value)?;
    }
    set(doc, "/config/stages/1/outputSchema", output_schema)?;
    set(doc, "/config/stages/1/inputSchema", input_schema)?;

    Ok(template)
}
