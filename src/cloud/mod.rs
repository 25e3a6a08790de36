//! Warehouse and object storage seams
//!
//! The orchestrator talks to these traits only; `bigquery` and `storage`
//! hold the REST implementations.

mod bigquery;
mod storage;

use std::path::{Path, PathBuf};

use crate::error::IngestError;
use crate::model::{ColumnSchema, DatasetRef, TableRef};

pub use bigquery::BigQueryClient;
pub use storage::{delete_prefix, upload_many, GcsBucket};

/// Result of a completed query job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutcome {
    pub job_id: String,
    /// Rows touched by a DML statement; `None` for DDL
    pub affected_rows: Option<u64>,
}

/// A recurring query registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledQuery {
    /// Project the transfer config is created in
    pub project: String,
    pub display_name: String,
    pub query: String,
    /// e.g. "every day 14:30"
    pub schedule: String,
    pub service_account: Option<String>,
}

/// The warehouse operations a run needs
pub trait Warehouse {
    /// Create the dataset unless it exists. Returns true when it was created.
    fn ensure_dataset(&self, dataset: &DatasetRef) -> Result<bool, IngestError>;

    /// Run a statement to completion.
    fn run_query(&self, sql: &str) -> Result<QueryOutcome, IngestError>;

    /// Append newline-delimited JSON at `source_uri` into `table`; returns
    /// the loaded row count.
    fn load_json(
        &self,
        source_uri: &str,
        table: &TableRef,
        schema: &[ColumnSchema],
    ) -> Result<u64, IngestError>;

    fn table_schema(&self, table: &TableRef) -> Result<Vec<ColumnSchema>, IngestError>;

    /// Drop a table. Returns false when it did not exist.
    fn delete_table(&self, table: &TableRef) -> Result<bool, IngestError>;

    /// Register a scheduled query, replacing the query and schedule of one
    /// already registered under the same display name. Returns its resource name.
    fn schedule_query(&self, request: &ScheduledQuery) -> Result<String, IngestError>;
}

/// One bucket of object storage
pub trait ObjectStore: Send + Sync {
    fn bucket(&self) -> &str;

    fn upload(&self, path: &Path, object_name: &str) -> Result<(), IngestError>;

    /// Names of every object under `prefix`
    fn list(&self, prefix: &str) -> Result<Vec<String>, IngestError>;

    /// Returns false when the object did not exist.
    fn delete(&self, object_name: &str) -> Result<bool, IngestError>;
}

/// A local file and the object name it is uploaded as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub path: PathBuf,
    pub object_name: String,
}
