//! Error types for sfsf-ingest

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while ingesting a SuccessFactors entity
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to parse metadata document for {entity}")]
    MetadataXmlError {
        entity: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("Malformed metadata for {entity}: missing {node}")]
    MetadataParseError { entity: String, node: String },

    #[error("Unsupported OData type '{type_name}'{}", field_suffix(.field))]
    UnsupportedTypeError {
        type_name: String,
        field: Option<String>,
    },

    #[error("Could not extract the module tag from the metadata of {entity}")]
    ModuleNotFoundError { entity: String },

    #[error("Entity {entity} declares no key fields")]
    EmptyKeysError { entity: String },

    #[error("Key {key} of entity {entity} is not a visible field")]
    UnknownKeyError { entity: String, key: String },

    #[error("Field {field} appears more than once in entity {entity}")]
    DuplicateFieldError { entity: String, field: String },

    #[error("Invalid SQL identifier: '{identifier}'")]
    InvalidIdentifier { identifier: String },

    #[error("Table {table} cannot be clustered by {count} columns (maximum {max})")]
    TooManyClusteringColumns {
        table: String,
        count: usize,
        max: usize,
    },

    #[error("Column {column} of {final_table} is missing from staging table {staging_table}")]
    MissingStagingColumn {
        column: String,
        final_table: String,
        staging_table: String,
    },

    #[error("HTTP request to {url} failed")]
    HttpError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}: {body}")]
    HttpStatusError {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {url}: {message}")]
    UnexpectedResponse { url: String, message: String },

    #[error("Entity {entity} exceeded the page limit of {max_pages} pages")]
    PageLimitExceeded { entity: String, max_pages: usize },

    #[error("Failed to write {path}")]
    LocalWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}")]
    LocalReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to upload {failed} of {total} file(s) to gs://{bucket}")]
    UploadError {
        bucket: String,
        failed: usize,
        total: usize,
    },

    #[error("Warehouse job {job_id} failed: {message}")]
    JobError { job_id: String, message: String },

    #[error("Pipeline template is missing {pointer}")]
    PipelineTemplateError { pointer: String },

    #[error("Invalid configuration: {message}")]
    ConfigError { message: String },
}

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_deref()
        .map(|f| format!(" for field {}", f))
        .unwrap_or_default()
}

impl IngestError {
    /// Attach the offending field name to an unsupported-type error.
    pub fn for_field(self, field_name: &str) -> Self {
        match self {
            IngestError::UnsupportedTypeError { type_name, .. } => {
                IngestError::UnsupportedTypeError {
                    type_name,
                    field: Some(field_name.to_string()),
                }
            }
            other => other,
        }
    }
}
