//! Common test utilities for sfsf-ingest tests
//!
//! In-memory stand-ins for the OData service, the warehouse and object
//! storage, plus a configuration rooted in a temporary directory.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{json, Value};
use tempfile::TempDir;

use sfsf_ingest::cloud::{ObjectStore, QueryOutcome, ScheduledQuery, Warehouse};
use sfsf_ingest::config::{
    HttpConfig, IngestConfig, LocalPaths, PipelineConfig, StorageConfig, SuccessFactorsConfig,
    WarehouseConfig,
};
use sfsf_ingest::model::{ColumnSchema, DatasetRef, TableRef};
use sfsf_ingest::odata::{ODataSource, Page, PageRequest, Row};
use sfsf_ingest::IngestError;

/// Path of a file under `tests/fixtures`
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn read_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name)).expect("Failed to read fixture")
}

/// Test context with temporary directory for isolated test execution
pub struct TestContext {
    /// Kept to prevent temp directory cleanup until TestContext is dropped
    _temp_dir: TempDir,
    pub root: PathBuf,
    pub config: IngestConfig,
}

impl TestContext {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        let config = IngestConfig {
            successfactors: SuccessFactorsConfig {
                base_url: "https://api.example.com/odata/v2".to_string(),
                user: "user@TENANT".to_string(),
                password: "secret".to_string(),
            },
            warehouse: warehouse_config(),
            storage: StorageConfig {
                temp_bucket: "temp-bucket".to_string(),
                pipelines_bucket: "pipelines-bucket".to_string(),
                upload_workers: 4,
            },
            pipeline: PipelineConfig {
                connection_id: "${conn(SuccessFactors)}".to_string(),
                sink_connection: "${conn(BigQuery-Raw)}".to_string(),
                template_path: None,
            },
            paths: LocalPaths {
                metadata_dir: root.join("metadata"),
                data_dir: root.join("data"),
                out_dir: root.join("out"),
            },
            http: HttpConfig {
                max_pages: 50,
                ..HttpConfig::default()
            },
            legacy_bytes_cast: false,
        };

        Self {
            _temp_dir: temp_dir,
            root,
            config,
        }
    }
}

pub fn warehouse_config() -> WarehouseConfig {
    WarehouseConfig {
        project: "raw-proj".to_string(),
        refined_project: "rf-proj".to_string(),
        location: "US".to_string(),
        dataset_prefix: "ds_sfsf".to_string(),
        scheduler_service_account: Some("sq-runner@rf-proj.iam.gserviceaccount.com".to_string()),
        schedule: "every day 14:30".to_string(),
        access_token: "token".to_string(),
    }
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("row must be a JSON object")
}

/// OData service serving a metadata document and a fixed list of pages
pub struct FakeOData {
    pub metadata: String,
    pub pages: Vec<Vec<Row>>,
    pub requests: RefCell<Vec<PageRequest>>,
}

impl FakeOData {
    pub fn new(metadata: String, pages: Vec<Vec<Row>>) -> Self {
        Self {
            metadata,
            pages,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// EmpJob rows the way the service returns them, `__metadata` included
    pub fn emp_job(pages: usize, rows_per_page: usize) -> Self {
        let pages = (0..pages)
            .map(|p| {
                (0..rows_per_page)
                    .map(|r| {
                        row(json!({
                            "__metadata": {
                                "uri": format!("https://api.example.com/odata/v2/EmpJob('{}')", r),
                                "type": "SFOData.EmpJob"
                            },
                            "personIdExternal": format!("p{}_{}", p, r),
                            "lastModifiedDateTime": "/Date(1700000000000)/",
                            "isActive": r % 2 == 0
                        }))
                    })
                    .collect()
            })
            .collect();
        Self::new(read_fixture("EmpJob_metadata.xml"), pages)
    }
}

impl ODataSource for FakeOData {
    fn metadata(&self, _entity: &str) -> Result<String, IngestError> {
        Ok(self.metadata.clone())
    }

    fn count(&self, _entity: &str) -> Result<u64, IngestError> {
        Ok(self.pages.iter().map(Vec::len).sum::<usize>() as u64)
    }

    fn page(&self, request: &PageRequest) -> Result<Page, IngestError> {
        let index = match request {
            PageRequest::First { .. } => 0,
            PageRequest::Next(url) => url
                .rsplit('/')
                .next()
                .and_then(|n| n.parse::<usize>().ok())
                .unwrap_or(usize::MAX),
        };
        self.requests.borrow_mut().push(request.clone());

        let results = self.pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < self.pages.len())
            .then(|| format!("https://api.example.com/odata/v2/next/{}", index + 1));
        Ok(Page { results, next })
    }
}

/// Warehouse that records every call
#[derive(Default)]
pub struct FakeWarehouse {
    pub datasets: RefCell<BTreeSet<String>>,
    pub datasets_created: Cell<usize>,
    pub queries: RefCell<Vec<String>>,
    pub loads: RefCell<Vec<(String, String)>>,
    pub deleted_tables: RefCell<Vec<String>>,
    pub scheduled: RefCell<Vec<ScheduledQuery>>,
    /// Schemas reported by `table_schema`, keyed by `project.dataset.table`
    pub schemas: RefCell<BTreeMap<String, Vec<ColumnSchema>>>,
    pub fail_load: Cell<bool>,
}

impl FakeWarehouse {
    pub fn with_schema(self, table: &str, columns: &[(&str, &str)]) -> Self {
        self.schemas.borrow_mut().insert(
            table.to_string(),
            columns
                .iter()
                .map(|(name, t)| ColumnSchema::new(name, t))
                .collect(),
        );
        self
    }

    /// Schemas the warehouse reports for the EmpJob fixture tables
    pub fn emp_job() -> Self {
        Self::default()
            .with_schema(
                "raw-proj.ds_sfsf_ec.EmpJob",
                &[
                    ("personIdExternal", "STRING"),
                    ("lastModifiedDateTime", "DATETIME"),
                    ("isActive", "BOOLEAN"),
                ],
            )
            .with_schema(
                "raw-proj.ds_sfsf_ec.temp_EmpJob",
                &[
                    ("personIdExternal", "STRING"),
                    ("lastModifiedDateTime", "STRING"),
                    ("isActive", "BOOLEAN"),
                ],
            )
    }

    pub fn queries_starting_with(&self, prefix: &str) -> Vec<String> {
        self.queries
            .borrow()
            .iter()
            .filter(|q| q.starts_with(prefix))
            .cloned()
            .collect()
    }
}

impl Warehouse for FakeWarehouse {
    fn ensure_dataset(&self, dataset: &DatasetRef) -> Result<bool, IngestError> {
        let created = self.datasets.borrow_mut().insert(dataset.to_string());
        if created {
            self.datasets_created.set(self.datasets_created.get() + 1);
        }
        Ok(created)
    }

    fn run_query(&self, sql: &str) -> Result<QueryOutcome, IngestError> {
        self.queries.borrow_mut().push(sql.to_string());
        let n = self.queries.borrow().len();
        let affected_rows = (sql.starts_with("INSERT") || sql.starts_with("MERGE")).then_some(3);
        Ok(QueryOutcome {
            job_id: format!("job_{}", n),
            affected_rows,
        })
    }

    fn load_json(
        &self,
        source_uri: &str,
        table: &TableRef,
        _schema: &[ColumnSchema],
    ) -> Result<u64, IngestError> {
        self.loads
            .borrow_mut()
            .push((source_uri.to_string(), table.to_string()));
        if self.fail_load.get() {
            return Err(IngestError::JobError {
                job_id: "load_1".to_string(),
                message: "Could not parse 'maybe' as BOOL".to_string(),
            });
        }
        Ok(6)
    }

    fn table_schema(&self, table: &TableRef) -> Result<Vec<ColumnSchema>, IngestError> {
        self.schemas
            .borrow()
            .get(&table.to_string())
            .cloned()
            .ok_or_else(|| IngestError::HttpStatusError {
                url: table.to_string(),
                status: 404,
                body: "Not found: Table".to_string(),
            })
    }

    fn delete_table(&self, table: &TableRef) -> Result<bool, IngestError> {
        self.deleted_tables.borrow_mut().push(table.to_string());
        Ok(true)
    }

    fn schedule_query(&self, request: &ScheduledQuery) -> Result<String, IngestError> {
        let mut scheduled = self.scheduled.borrow_mut();
        let index = match scheduled
            .iter()
            .position(|q| q.display_name == request.display_name)
        {
            Some(index) => {
                scheduled[index] = request.clone();
                index
            }
            None => {
                scheduled.push(request.clone());
                scheduled.len() - 1
            }
        };
        Ok(format!(
            "projects/{}/locations/us/transferConfigs/{}",
            request.project,
            index + 1
        ))
    }
}

/// Object storage held in memory; uploads capture the file contents
pub struct MemoryStore {
    pub bucket: String,
    pub objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.objects
            .lock()
            .unwrap()
            .get(name)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn upload(&self, path: &Path, object_name: &str) -> Result<(), IngestError> {
        let bytes = fs::read(path).map_err(|e| IngestError::LocalReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.objects
            .lock()
            .unwrap()
            .insert(object_name.to_string(), bytes);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, IngestError> {
        Ok(self
            .names()
            .into_iter()
            .filter(|n| n.starts_with(prefix))
            .collect())
    }

    fn delete(&self, object_name: &str) -> Result<bool, IngestError> {
        Ok(self.objects.lock().unwrap().remove(object_name).is_some())
    }
}
