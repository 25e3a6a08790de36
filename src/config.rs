//! Run configuration
//!
//! Built once by the CLI and passed by reference to every step; nothing
//! below `main` reads the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::IngestError;

/// SuccessFactors OData endpoint and credentials
#[derive(Debug, Clone)]
pub struct SuccessFactorsConfig {
    /// e.g. `https://api19.sapsf.com/odata/v2`
    pub base_url: String,
    pub user: String,
    pub password: String,
}

/// Warehouse projects and scheduling
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Project holding the staging and final tables
    pub project: String,
    /// Project holding the refined tables and the scheduled merge
    pub refined_project: String,
    /// Dataset and job location (e.g. "US")
    pub location: String,
    /// Dataset names are `{dataset_prefix}_{module code}`
    pub dataset_prefix: String,
    /// Service account the scheduled merge runs as
    pub scheduler_service_account: Option<String>,
    /// Transfer schedule, e.g. "every day 14:30"
    pub schedule: String,
    /// OAuth2 bearer token for the warehouse and storage APIs
    pub access_token: String,
}

/// Object storage buckets
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Bucket for page files (and the pipeline's temporary bucket)
    pub temp_bucket: String,
    /// Bucket the pipeline description is published to
    pub pipelines_bucket: String,
    /// Parallel upload workers
    pub upload_workers: usize,
}

/// Pipeline description settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Connection id of the SuccessFactors source in the orchestration product
    pub connection_id: String,
    /// Connection reference of the warehouse sink
    pub sink_connection: String,
    /// Replaces the built-in template when set
    pub template_path: Option<PathBuf>,
}

/// Local working directories
#[derive(Debug, Clone)]
pub struct LocalPaths {
    pub metadata_dir: PathBuf,
    pub data_dir: PathBuf,
    pub out_dir: PathBuf,
}

impl Default for LocalPaths {
    fn default() -> Self {
        Self {
            metadata_dir: PathBuf::from("metadata"),
            data_dir: PathBuf::from("data"),
            out_dir: PathBuf::from("out"),
        }
    }
}

/// HTTP behavior shared by every client
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    /// Retries after the first attempt for connection errors, 429 and 5xx
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Upper bound on followed `__next` links
    pub max_pages: usize,
    /// How long to wait for a warehouse job before giving up
    pub job_timeout: Duration,
    pub job_poll_interval: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            max_retries: 3,
            retry_backoff: Duration::from_secs(2),
            max_pages: 10_000,
            job_timeout: Duration::from_secs(600),
            job_poll_interval: Duration::from_secs(2),
        }
    }
}

/// Everything a run needs
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub successfactors: SuccessFactorsConfig,
    pub warehouse: WarehouseConfig,
    pub storage: StorageConfig,
    pub pipeline: PipelineConfig,
    pub paths: LocalPaths,
    pub http: HttpConfig,
    /// Emit the historical BYTES conversion expression
    pub legacy_bytes_cast: bool,
}

impl IngestConfig {
    /// Reject empty required settings before any network call.
    pub fn validate(&self) -> Result<(), IngestError> {
        let required = [
            ("SuccessFactors base URL", &self.successfactors.base_url),
            ("SuccessFactors user", &self.successfactors.user),
            ("SuccessFactors password", &self.successfactors.password),
            ("warehouse project", &self.warehouse.project),
            ("refined project", &self.warehouse.refined_project),
            ("warehouse location", &self.warehouse.location),
            ("dataset prefix", &self.warehouse.dataset_prefix),
            ("schedule", &self.warehouse.schedule),
            ("access token", &self.warehouse.access_token),
            ("temp bucket", &self.storage.temp_bucket),
            ("pipelines bucket", &self.storage.pipelines_bucket),
            ("pipeline connection id", &self.pipeline.connection_id),
        ];
        for (label, value) in required {
            if value.trim().is_empty() {
                return Err(IngestError::ConfigError {
                    message: format!("{} is not set", label),
                });
            }
        }

        if self.storage.upload_workers == 0 {
            return Err(IngestError::ConfigError {
                message: "upload workers must be at least 1".to_string(),
            });
        }
        if self.http.max_pages == 0 {
            return Err(IngestError::ConfigError {
                message: "max pages must be at least 1".to_string(),
            });
        }
        url::Url::parse(&self.successfactors.base_url).map_err(|e| IngestError::ConfigError {
            message: format!(
                "invalid SuccessFactors base URL {}: {}",
                self.successfactors.base_url, e
            ),
        })?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> IngestConfig {
    IngestConfig {
        successfactors: SuccessFactorsConfig {
            base_url: "https://api.example.com/odata/v2".to_string(),
            user: "user@TENANT".to_string(),
            password: "secret".to_string(),
        },
        warehouse: WarehouseConfig {
            project: "raw-proj".to_string(),
            refined_project: "rf-proj".to_string(),
            location: "US".to_string(),
            dataset_prefix: "ds_sfsf".to_string(),
            scheduler_service_account: None,
            schedule: "every day 14:30".to_string(),
            access_token: "token".to_string(),
        },
        storage: StorageConfig {
            temp_bucket: "temp-bucket".to_string(),
            pipelines_bucket: "pipelines-bucket".to_string(),
            upload_workers: 8,
        },
        pipeline: PipelineConfig {
            connection_id: "${conn(SuccessFactors)}".to_string(),
            sink_connection: "${conn(BigQuery-Raw)}".to_string(),
            template_path: None,
        },
        paths: LocalPaths::default(),
        http: HttpConfig::default(),
        legacy_bytes_cast: false,
    }
}
