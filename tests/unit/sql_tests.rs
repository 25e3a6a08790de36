//! Unit tests for statement synthesis over parsed fixtures

use std::path::PathBuf;

use pretty_assertions::assert_eq;

use sfsf_ingest::config::WarehouseConfig;
use sfsf_ingest::edm::EdmType;
use sfsf_ingest::metadata::parse_metadata;
use sfsf_ingest::model::{final_schema, staging_schema, EntityDescriptor, FieldDescriptor};
use sfsf_ingest::sql::{create_insert_select, merge_condition, CastOptions};
use sfsf_ingest::{plan, SynthesisPlan};

fn load(entity: &str) -> EntityDescriptor {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(format!("{}_metadata.xml", entity));
    parse_metadata(entity, &std::fs::read_to_string(path).unwrap()).unwrap()
}

fn warehouse() -> WarehouseConfig {
    WarehouseConfig {
        project: "raw-proj".to_string(),
        refined_project: "rf-proj".to_string(),
        location: "US".to_string(),
        dataset_prefix: "ds_sfsf".to_string(),
        scheduler_service_account: None,
        schedule: "every day 14:30".to_string(),
        access_token: String::new(),
    }
}

fn plan_for(entity: &EntityDescriptor) -> SynthesisPlan {
    plan(entity, &warehouse()).unwrap()
}

fn insert_for(entity: &EntityDescriptor, plan: &SynthesisPlan, options: CastOptions) -> String {
    create_insert_select(
        &plan.tables.final_table,
        &final_schema(entity),
        &plan.tables.staging,
        &staging_schema(entity),
        options,
    )
    .unwrap()
}

// ============================================================================
// EmpJob end to end: STRING key, DATETIME, BOOL
// ============================================================================

#[test]
fn test_emp_job_final_table() {
    let entity = load("EmpJob");
    assert_eq!(
        plan_for(&entity).create_final,
        "CREATE TABLE IF NOT EXISTS `raw-proj.ds_sfsf_ec.EmpJob` (
  personIdExternal STRING NOT NULL OPTIONS(description='Person ID.'),
  lastModifiedDateTime DATETIME OPTIONS(description='Last Modified On.'),
  isActive BOOL OPTIONS(description='Active.')
)
PARTITION BY TIMESTAMP_TRUNC(_PARTITIONTIME, DAY)
CLUSTER BY personIdExternal
OPTIONS(description='Job information of an employee, effective dated.');"
    );
}

#[test]
fn test_emp_job_staging_table() {
    let entity = load("EmpJob");
    assert_eq!(
        plan_for(&entity).create_staging,
        "CREATE TABLE IF NOT EXISTS `raw-proj.ds_sfsf_ec.temp_EmpJob` (
  personIdExternal STRING,
  lastModifiedDateTime STRING,
  isActive BOOL
);"
    );
}

#[test]
fn test_emp_job_refined_table_is_not_partitioned() {
    let entity = load("EmpJob");
    let ddl = plan_for(&entity).create_refined;
    assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS `rf-proj.ds_sfsf_ec.EmpJob` ("));
    assert!(!ddl.contains("PARTITION BY"));
    assert!(ddl.contains("\nCLUSTER BY personIdExternal\n"));
}

#[test]
fn test_emp_job_insert_select() {
    let entity = load("EmpJob");
    let plan = plan_for(&entity);
    assert_eq!(
        insert_for(&entity, &plan, CastOptions::default()),
        r#"INSERT INTO `raw-proj.ds_sfsf_ec.EmpJob` (
  personIdExternal,
  lastModifiedDateTime,
  isActive
)
SELECT
  personIdExternal AS personIdExternal,
  EXTRACT(DATETIME FROM TIMESTAMP_MILLIS(CAST(REGEXP_EXTRACT(lastModifiedDateTime, r"/Date\((-?\d+)\)") AS INT64))) AS lastModifiedDateTime,
  CAST(isActive AS BOOL) AS isActive
FROM `raw-proj.ds_sfsf_ec.temp_EmpJob`;"#
    );
}

#[test]
fn test_emp_job_merge() {
    let entity = load("EmpJob");
    assert_eq!(
        plan_for(&entity).merge,
        "MERGE INTO `rf-proj.ds_sfsf_ec.EmpJob` AS target
USING (
  SELECT personIdExternal, lastModifiedDateTime, isActive
  FROM `raw-proj.ds_sfsf_ec.EmpJob`
  WHERE TIMESTAMP_TRUNC(_PARTITIONTIME, DAY) = TIMESTAMP(CURRENT_DATE())
) AS source
ON source.personIdExternal=target.personIdExternal
WHEN MATCHED THEN
  UPDATE SET target.lastModifiedDateTime=source.lastModifiedDateTime, target.isActive=source.isActive
WHEN NOT MATCHED BY TARGET THEN
  INSERT (personIdExternal, lastModifiedDateTime, isActive)
  VALUES (source.personIdExternal, source.lastModifiedDateTime, source.isActive);"
    );
}

// ============================================================================
// PerPersonal: composite key and literal escaping
// ============================================================================

#[test]
fn test_per_personal_clusters_on_both_keys_in_order() {
    let entity = load("PerPersonal");
    let plan = plan_for(&entity);
    assert!(plan
        .create_final
        .contains("\nCLUSTER BY personIdExternal, startDate\n"));
    assert!(plan
        .create_refined
        .contains("\nCLUSTER BY personIdExternal, startDate\n"));
}

#[test]
fn test_per_personal_merge_condition() {
    let entity = load("PerPersonal");
    assert_eq!(
        merge_condition(&entity.keys),
        "source.personIdExternal=target.personIdExternal AND source.startDate=target.startDate"
    );

    let merge = plan_for(&entity).merge;
    assert!(merge.contains(
        "\nON source.personIdExternal=target.personIdExternal AND source.startDate=target.startDate\n"
    ));
    assert!(!merge.contains("target.startDate=source.startDate"));
}

#[test]
fn test_table_description_is_escaped() {
    let entity = load("PerPersonal");
    assert!(plan_for(&entity).create_final.ends_with(
        r"OPTIONS(description='Personal information of a person: names, gender, marital status. Don\'t rely on \'displayName\'.');"
    ));
}

#[test]
fn test_column_description_is_escaped() {
    let entity = load("PerPersonal");
    let plan = plan_for(&entity);
    let line = r"  firstName STRING OPTIONS(description='Employee\'s First Name.'),";
    assert!(plan.create_final.contains(line));
    assert!(plan.create_refined.contains(line));
}

#[test]
fn test_per_personal_casts() {
    let entity = load("PerPersonal");
    let plan = plan_for(&entity);
    let sql = insert_for(&entity, &plan, CastOptions::default());

    assert!(sql.contains("  CAST(dependents AS INTEGER) AS dependents,\n"));
    assert!(sql.contains("  CAST(salaryFactor AS DECIMAL) AS salaryFactor,\n"));
    assert!(sql.contains(
        r#"  FROM_HEX(REGEXP_EXTRACT(photo, r"(?:X|binary)'([A-Fa-f0-9]+)'")) AS photo,"#
    ));
    assert!(sql.contains(
        r#"  TIMESTAMP_MILLIS(CAST(REGEXP_EXTRACT(createdDateTime, r"/Date\(([-+]?\d+)\+0000\)/") AS INT64)) AS createdDateTime,"#
    ));
}

#[test]
fn test_legacy_bytes_cast_flag() {
    let entity = load("PerPersonal");
    let plan = plan_for(&entity);
    let sql = insert_for(
        &entity,
        &plan,
        CastOptions {
            legacy_bytes_cast: true,
        },
    );
    assert!(sql.contains("SELECT CAST(cast(REGEXP_EXTRACT(photo,"));
    assert!(!sql.contains("FROM_HEX"));
}

// ============================================================================
// Reserved keywords as column names
// ============================================================================

#[test]
fn test_reserved_word_columns_quoted_in_every_statement() {
    let entity = EntityDescriptor::new(
        "PayRange".to_string(),
        "Compensation (COMP)".to_string(),
        "Pay ranges.".to_string(),
        vec!["code".to_string()],
        vec![
            FieldDescriptor::new("code", EdmType::String, false, "Code.".to_string()),
            FieldDescriptor::new("range", EdmType::Decimal, true, "Range.".to_string()),
            FieldDescriptor::new("end", EdmType::DateTime, true, "End.".to_string()),
        ],
    )
    .unwrap();
    let plan = plan_for(&entity);

    assert!(plan
        .create_final
        .contains("\n  `range` DECIMAL OPTIONS(description='Range.'),\n"));
    assert!(plan.create_staging.contains("\n  `end` STRING\n"));
    assert!(plan
        .merge
        .contains("UPDATE SET target.`range`=source.`range`, target.`end`=source.`end`"));

    let insert = insert_for(&entity, &plan, CastOptions::default());
    assert!(insert.contains("\n  CAST(`range` AS DECIMAL) AS `range`,\n"));
    assert!(insert.contains("REGEXP_EXTRACT(`end`, "));
}
