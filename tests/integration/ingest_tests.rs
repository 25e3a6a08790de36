//! Orchestrator tests against in-memory services

use std::fs;

use serde_json::Value;

use sfsf_ingest::odata::PageRequest;
use sfsf_ingest::{run_ingest, IngestError, Services};

use crate::common::{read_fixture, FakeOData, FakeWarehouse, MemoryStore, TestContext};

const PREFIX: &str = "empjob_2024-03-01_101500";

struct Harness {
    ctx: TestContext,
    odata: FakeOData,
    warehouse: FakeWarehouse,
    temp_store: MemoryStore,
    pipeline_store: MemoryStore,
}

impl Harness {
    fn new(odata: FakeOData) -> Self {
        Self {
            ctx: TestContext::new(),
            odata,
            warehouse: FakeWarehouse::emp_job(),
            temp_store: MemoryStore::new("temp-bucket"),
            pipeline_store: MemoryStore::new("pipelines-bucket"),
        }
    }

    fn run(&self, entity: &str, prefix: &str) -> Result<sfsf_ingest::IngestReport, IngestError> {
        let services = Services {
            odata: &self.odata,
            warehouse: &self.warehouse,
            temp_store: &self.temp_store,
            pipeline_store: &self.pipeline_store,
        };
        run_ingest(&self.ctx.config, entity, &services, prefix)
    }
}

// ============================================================================
// Successful run
// ============================================================================

#[test]
fn test_emp_job_run_report() {
    let h = Harness::new(FakeOData::emp_job(3, 2));
    let report = h.run("EmpJob", PREFIX).unwrap();

    assert_eq!(report.entity, "EmpJob");
    assert_eq!(report.reported_rows, 6);
    assert_eq!(report.pages, 3);
    assert_eq!(report.rows_written, 6);
    assert_eq!(report.files_uploaded, 3);
    assert_eq!(report.rows_loaded, 6);
    assert_eq!(report.rows_inserted, Some(3));
    assert_eq!(report.rows_merged, Some(3));
    assert_eq!(
        report.scheduled_query,
        "projects/rf-proj/locations/us/transferConfigs/1"
    );
}

#[test]
fn test_emp_job_run_statement_order() {
    let h = Harness::new(FakeOData::emp_job(1, 2));
    h.run("EmpJob", PREFIX).unwrap();

    let datasets: Vec<String> = h.warehouse.datasets.borrow().iter().cloned().collect();
    assert_eq!(datasets, vec!["raw-proj.ds_sfsf_ec", "rf-proj.ds_sfsf_ec"]);

    let heads: Vec<String> = h
        .warehouse
        .queries
        .borrow()
        .iter()
        .map(|q| q.lines().next().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        heads,
        vec![
            "CREATE TABLE IF NOT EXISTS `raw-proj.ds_sfsf_ec.EmpJob` (",
            "CREATE TABLE IF NOT EXISTS `rf-proj.ds_sfsf_ec.EmpJob` (",
            "CREATE TABLE IF NOT EXISTS `raw-proj.ds_sfsf_ec.temp_EmpJob` (",
            "INSERT INTO `raw-proj.ds_sfsf_ec.EmpJob` (",
            "MERGE INTO `rf-proj.ds_sfsf_ec.EmpJob` AS target",
        ]
    );

    let insert = &h.warehouse.queries_starting_with("INSERT")[0];
    assert!(insert.contains("  personIdExternal AS personIdExternal,\n"));
    assert!(insert.contains("EXTRACT(DATETIME FROM TIMESTAMP_MILLIS("));
    assert!(insert.contains("  CAST(isActive AS BOOL) AS isActive\n"));

    assert_eq!(
        *h.warehouse.loads.borrow(),
        vec![(
            format!("gs://temp-bucket/{}/*.json", PREFIX),
            "raw-proj.ds_sfsf_ec.temp_EmpJob".to_string()
        )]
    );
}

#[test]
fn test_emp_job_selects_visible_fields_only() {
    let h = Harness::new(FakeOData::emp_job(2, 1));
    h.run("EmpJob", PREFIX).unwrap();

    let requests = h.odata.requests.borrow();
    assert_eq!(
        requests[0],
        PageRequest::First {
            entity: "EmpJob".to_string(),
            select: vec![
                "personIdExternal".to_string(),
                "lastModifiedDateTime".to_string(),
                "isActive".to_string()
            ],
        }
    );
    assert_eq!(
        requests[1],
        PageRequest::Next("https://api.example.com/odata/v2/next/1".to_string())
    );
}

#[test]
fn test_local_artifacts() {
    let h = Harness::new(FakeOData::emp_job(2, 2));
    let report = h.run("EmpJob", PREFIX).unwrap();
    let paths = &h.ctx.config.paths;

    let side_file = fs::read_to_string(paths.metadata_dir.join("EmpJob_metadata.json")).unwrap();
    let descriptor: Value = serde_json::from_str(&side_file).unwrap();
    assert_eq!(descriptor["keys"][0], "personIdExternal");

    let page = fs::read_to_string(paths.data_dir.join(PREFIX).join("EmpJob_data_1.json")).unwrap();
    let rows: Vec<Value> = page
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["personIdExternal"], "p1_0");
    assert!(rows.iter().all(|r| r.get("__metadata").is_none()));

    assert_eq!(
        report.pipeline_path,
        paths.out_dir.join("EmpJob_SuccessFactors-cdap-data-pipeline.json")
    );
    assert!(report.pipeline_path.exists());
}

#[test]
fn test_pipeline_published_and_merge_scheduled() {
    let h = Harness::new(FakeOData::emp_job(1, 1));
    h.run("EmpJob", PREFIX).unwrap();

    assert_eq!(
        h.pipeline_store.names(),
        vec!["EmpJob_SuccessFactors-cdap-data-pipeline.json"]
    );
    let published: Value = serde_json::from_str(
        &h.pipeline_store
            .text("EmpJob_SuccessFactors-cdap-data-pipeline.json")
            .unwrap(),
    )
    .unwrap();
    assert_eq!(published["name"], "EmpJob_SuccessFactors");
    assert_eq!(
        published["config"]["stages"][1]["plugin"]["properties"]["dataset"],
        "ds_sfsf_ec"
    );

    let scheduled = h.warehouse.scheduled.borrow();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].display_name, "EmpJob_scheduled_merge");
    assert_eq!(scheduled[0].project, "rf-proj");
    assert_eq!(scheduled[0].schedule, "every day 14:30");
    assert_eq!(
        scheduled[0].query,
        h.warehouse.queries_starting_with("MERGE")[0]
    );
}

#[test]
fn test_staging_removed_after_success() {
    let h = Harness::new(FakeOData::emp_job(3, 1));
    h.run("EmpJob", PREFIX).unwrap();

    assert_eq!(
        *h.warehouse.deleted_tables.borrow(),
        vec!["raw-proj.ds_sfsf_ec.temp_EmpJob".to_string()]
    );
    assert!(h.temp_store.names().is_empty());
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn test_second_run_against_same_destination() {
    let h = Harness::new(FakeOData::emp_job(1, 1));
    let first = h.run("EmpJob", PREFIX).unwrap();
    let second = h.run("EmpJob", "empjob_2024-03-02_101500").unwrap();

    assert_eq!(h.warehouse.datasets_created.get(), 2);
    assert_eq!(
        h.warehouse
            .queries_starting_with("CREATE TABLE IF NOT EXISTS")
            .len(),
        6
    );
    assert_eq!(h.warehouse.scheduled.borrow().len(), 1);
    assert_eq!(first.scheduled_query, second.scheduled_query);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_unsupported_type_aborts_before_any_mutation() {
    let h = Harness::new(FakeOData::new(read_fixture("Unsupported_metadata.xml"), vec![]));
    let err = h.run("Photo", PREFIX).unwrap_err();

    assert!(matches!(
        err,
        IngestError::UnsupportedTypeError { ref field, .. } if field.as_deref() == Some("photoStream")
    ));
    assert!(h.warehouse.datasets.borrow().is_empty());
    assert!(h.warehouse.queries.borrow().is_empty());
    assert!(h.warehouse.deleted_tables.borrow().is_empty());
}

#[test]
fn test_failed_load_still_cleans_up() {
    let h = Harness::new(FakeOData::emp_job(2, 2));
    h.warehouse.fail_load.set(true);

    let err = h.run("EmpJob", PREFIX).unwrap_err();
    assert!(matches!(err, IngestError::JobError { .. }));

    assert_eq!(
        *h.warehouse.deleted_tables.borrow(),
        vec!["raw-proj.ds_sfsf_ec.temp_EmpJob".to_string()]
    );
    assert!(h.temp_store.names().is_empty());
    assert!(h.warehouse.queries_starting_with("INSERT").is_empty());
    assert!(h.warehouse.queries_starting_with("MERGE").is_empty());
    assert!(h.warehouse.scheduled.borrow().is_empty());
    assert!(h.pipeline_store.names().is_empty());
}

#[test]
fn test_page_limit_cleans_up() {
    let mut h = Harness::new(FakeOData::emp_job(5, 1));
    h.ctx.config.http.max_pages = 2;

    let err = h.run("EmpJob", PREFIX).unwrap_err();
    assert!(matches!(
        err,
        IngestError::PageLimitExceeded { max_pages: 2, .. }
    ));
    assert!(h.warehouse.loads.borrow().is_empty());
    assert_eq!(h.warehouse.deleted_tables.borrow().len(), 1);
}

#[test]
fn test_missing_final_table_schema_fails_insert() {
    let mut h = Harness::new(FakeOData::emp_job(1, 1));
    h.warehouse = FakeWarehouse::default().with_schema(
        "raw-proj.ds_sfsf_ec.temp_EmpJob",
        &[("personIdExternal", "STRING")],
    );

    let err = h.run("EmpJob", PREFIX).unwrap_err();
    assert!(matches!(err, IngestError::HttpStatusError { status: 404, .. }));
    assert_eq!(h.warehouse.deleted_tables.borrow().len(), 1);
}
