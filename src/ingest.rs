//! End-to-end ingestion of one entity
//!
//! Every statement is synthesized before the first warehouse mutation, so a
//! malformed or unsupported schema never leaves half-created tables behind.
//! Once the staging table exists, it and the uploaded page files are removed
//! whether or not the load succeeds.

use std::path::PathBuf;

use chrono::{DateTime, TimeZone};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cloud::{delete_prefix, upload_many, ObjectStore, ScheduledQuery, Warehouse};
use crate::config::{IngestConfig, WarehouseConfig};
use crate::error::IngestError;
use crate::metadata::parse_metadata;
use crate::model::{staging_schema, EntityDescriptor, EntityTables};
use crate::odata::{fetch_all_pages, ODataSource};
use crate::pipeline::{build_pipeline, load_template, PipelineSettings};
use crate::sql::{
    create_final_table, create_insert_select, create_merge, create_refined_table,
    create_staging_table, CastOptions,
};
use crate::staging;

/// The external systems a run talks to
pub struct Services<'a> {
    pub odata: &'a dyn ODataSource,
    pub warehouse: &'a dyn Warehouse,
    /// Bucket receiving the page files
    pub temp_store: &'a dyn ObjectStore,
    /// Bucket receiving the pipeline description
    pub pipeline_store: &'a dyn ObjectStore,
}

/// Statements derivable from the descriptor alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisPlan {
    pub tables: EntityTables,
    pub create_staging: String,
    pub create_final: String,
    pub create_refined: String,
    pub merge: String,
}

impl SynthesisPlan {
    /// DDL in execution order
    pub fn ddl(&self) -> [&str; 3] {
        [&self.create_final, &self.create_refined, &self.create_staging]
    }
}

/// Synthesize every descriptor-derived statement.
pub fn plan(
    entity: &EntityDescriptor,
    warehouse: &WarehouseConfig,
) -> Result<SynthesisPlan, IngestError> {
    let tables = EntityTables::for_entity(
        entity,
        &warehouse.project,
        &warehouse.refined_project,
        &warehouse.dataset_prefix,
    )?;

    Ok(SynthesisPlan {
        create_staging: create_staging_table(entity, &tables.staging),
        create_final: create_final_table(entity, &tables.final_table)?,
        create_refined: create_refined_table(entity, &tables.refined)?,
        merge: create_merge(entity, &tables.final_table, &tables.refined)?,
        tables,
    })
}

/// Object prefix (and local data subdirectory) for one run,
/// e.g. `empjob_2024-03-01_101500`.
pub fn run_prefix<Tz: TimeZone>(entity: &str, started: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_{}",
        entity.to_lowercase(),
        started.format("%Y-%m-%d_%H%M%S")
    )
}

/// What a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub entity: String,
    pub prefix: String,
    /// Row count reported by the service before paging
    pub reported_rows: u64,
    pub pages: usize,
    pub rows_written: usize,
    pub files_uploaded: usize,
    pub rows_loaded: u64,
    pub rows_inserted: Option<u64>,
    pub rows_merged: Option<u64>,
    pub pipeline_path: PathBuf,
    pub scheduled_query: String,
}

/// Ingest `entity` end to end.
pub fn run_ingest(
    config: &IngestConfig,
    entity: &str,
    services: &Services<'_>,
    prefix: &str,
) -> Result<IngestReport, IngestError> {
    info!(entity, prefix, "starting ingestion");

    let xml = services.odata.metadata(entity)?;
    let descriptor = parse_metadata(entity, &xml)?;
    staging::write_pretty_json(
        &staging::metadata_path(&config.paths.metadata_dir, entity),
        &descriptor,
    )?;
    info!(
        entity,
        fields = descriptor.fields.len(),
        keys = ?descriptor.keys,
        "parsed metadata"
    );

    let plan = plan(&descriptor, &config.warehouse)?;
    let pipeline = build_pipeline(
        &descriptor,
        load_template(config.pipeline.template_path.as_deref())?,
        &PipelineSettings {
            connection_id: config.pipeline.connection_id.clone(),
            sink_connection: config.pipeline.sink_connection.clone(),
            temp_bucket: config.storage.temp_bucket.clone(),
            dataset: plan.tables.final_table.dataset.clone(),
            location: config.warehouse.location.clone(),
        },
    )?;

    let mut report = IngestReport {
        entity: entity.to_string(),
        prefix: prefix.to_string(),
        ..Default::default()
    };

    create_tables(services.warehouse, &plan)?;

    let loaded = load_and_insert(config, &descriptor, &plan, services, prefix, &mut report);
    cleanup(services, &plan, prefix);
    loaded?;

    report.pipeline_path = publish_pipeline(config, entity, &pipeline, services.pipeline_store)?;

    let merged = services.warehouse.run_query(&plan.merge)?;
    report.rows_merged = merged.affected_rows;
    info!(entity, rows = ?merged.affected_rows, "merged into refined table");

    report.scheduled_query = services.warehouse.schedule_query(&ScheduledQuery {
        project: config.warehouse.refined_project.clone(),
        display_name: format!("{}_scheduled_merge", entity),
        query: plan.merge.clone(),
        schedule: config.warehouse.schedule.clone(),
        service_account: config.warehouse.scheduler_service_account.clone(),
    })?;
    info!(entity, name = %report.scheduled_query, "scheduled daily merge");

    Ok(report)
}

fn create_tables(warehouse: &dyn Warehouse, plan: &SynthesisPlan) -> Result<(), IngestError> {
    for dataset in [
        plan.tables.final_table.dataset_ref(),
        plan.tables.refined.dataset_ref(),
    ] {
        warehouse.ensure_dataset(&dataset)?;
    }

    for sql in plan.ddl() {
        debug!(sql, "executing DDL");
        warehouse.run_query(sql)?;
    }
    info!(
        final_table = %plan.tables.final_table,
        refined = %plan.tables.refined,
        staging = %plan.tables.staging,
        "tables ready"
    );
    Ok(())
}

fn load_and_insert(
    config: &IngestConfig,
    descriptor: &EntityDescriptor,
    plan: &SynthesisPlan,
    services: &Services<'_>,
    prefix: &str,
    report: &mut IngestReport,
) -> Result<(), IngestError> {
    let entity = descriptor.name.as_str();

    report.reported_rows = services.odata.count(entity)?;
    info!(entity, rows = report.reported_rows, "entity row count");

    let select: Vec<String> = descriptor.column_names().map(str::to_string).collect();
    let data_dir = &config.paths.data_dir;
    let mut rows_written = 0;
    let stats = fetch_all_pages(
        services.odata,
        entity,
        &select,
        config.http.max_pages,
        |page, rows| {
            let path = staging::page_path(data_dir, prefix, entity, page);
            rows_written += staging::write_page(&path, rows)?;
            Ok(())
        },
    )?;
    report.pages = stats.pages;
    report.rows_written = rows_written;

    let files = staging::collect_page_files(&data_dir.join(prefix), prefix)?;
    report.files_uploaded = upload_many(
        services.temp_store,
        &files,
        config.storage.upload_workers,
    )?;

    let source_uri = format!("gs://{}/{}/*.json", services.temp_store.bucket(), prefix);
    report.rows_loaded = services.warehouse.load_json(
        &source_uri,
        &plan.tables.staging,
        &staging_schema(descriptor),
    )?;
    info!(entity, rows = report.rows_loaded, table = %plan.tables.staging, "loaded staging table");

    let final_columns = services.warehouse.table_schema(&plan.tables.final_table)?;
    let staging_columns = services.warehouse.table_schema(&plan.tables.staging)?;
    let insert = create_insert_select(
        &plan.tables.final_table,
        &final_columns,
        &plan.tables.staging,
        &staging_columns,
        CastOptions {
            legacy_bytes_cast: config.legacy_bytes_cast,
        },
    )?;
    debug!(sql = %insert, "executing insert");

    let inserted = services.warehouse.run_query(&insert)?;
    report.rows_inserted = inserted.affected_rows;
    info!(entity, rows = ?inserted.affected_rows, table = %plan.tables.final_table, "inserted into final table");
    Ok(())
}

/// Best effort: failures are logged, never returned.
fn cleanup(services: &Services<'_>, plan: &SynthesisPlan, prefix: &str) {
    match services.warehouse.delete_table(&plan.tables.staging) {
        Ok(true) => info!(table = %plan.tables.staging, "dropped staging table"),
        Ok(false) => debug!(table = %plan.tables.staging, "staging table already gone"),
        Err(e) => warn!(table = %plan.tables.staging, error = %e, "could not drop staging table"),
    }
    delete_prefix(services.temp_store, &format!("{}/", prefix));
}

fn publish_pipeline(
    config: &IngestConfig,
    entity: &str,
    pipeline: &Value,
    store: &dyn ObjectStore,
) -> Result<PathBuf, IngestError> {
    let file_name = staging::pipeline_file_name(entity);
    let path = config.paths.out_dir.join(&file_name);
    staging::write_pretty_json(&path, pipeline)?;
    store.upload(&path, &file_name)?;
    info!(entity, bucket = store.bucket(), object = %file_name, "published pipeline description");
    Ok(path)
}
