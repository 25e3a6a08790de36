//! sfsf-ingest: SAP SuccessFactors to BigQuery ingestion
//!
//! This library derives warehouse schemas and SQL from an entity's OData
//! `$metadata` document, lands the entity's rows in Cloud Storage, loads and
//! type-casts them into BigQuery, and schedules a daily merge into the
//! refined table.

pub mod cloud;
pub mod config;
pub mod edm;
pub mod error;
pub mod http;
pub mod ingest;
pub mod metadata;
pub mod model;
pub mod odata;
pub mod pipeline;
pub mod sql;
pub mod staging;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;

pub use config::IngestConfig;
pub use error::IngestError;
pub use ingest::{plan, run_ingest, run_prefix, IngestReport, Services, SynthesisPlan};

use cloud::{BigQueryClient, GcsBucket};
use config::WarehouseConfig;
use http::{build_client, RetryPolicy};
use model::{final_schema, staging_schema};
use odata::ODataClient;
use sql::{create_insert_select, CastOptions};

/// Ingest one entity against the configured services
pub fn ingest(config: &IngestConfig, entity: &str) -> Result<IngestReport> {
    config.validate()?;

    let http = build_client(&config.http)?;
    let retry = RetryPolicy::from(&config.http);
    let token = &config.warehouse.access_token;

    let odata = ODataClient::new(http.clone(), &config.successfactors, retry);
    let warehouse = BigQueryClient::new(
        http.clone(),
        &config.warehouse.project,
        &config.warehouse.location,
        token,
        retry,
        config.http.job_timeout,
        config.http.job_poll_interval,
    );
    let temp_store = GcsBucket::new(http.clone(), &config.storage.temp_bucket, token, retry);
    let pipeline_store = GcsBucket::new(http, &config.storage.pipelines_bucket, token, retry);

    let services = Services {
        odata: &odata,
        warehouse: &warehouse,
        temp_store: &temp_store,
        pipeline_store: &pipeline_store,
    };
    let prefix = run_prefix(entity, &Local::now());

    run_ingest(config, entity, &services, &prefix)
        .with_context(|| format!("Ingestion of {} failed", entity))
}

/// Render every statement for a metadata file without touching the network.
///
/// The INSERT is built from the schemas the metadata implies rather than
/// schemas read back from the warehouse.
pub fn render(
    metadata_path: &Path,
    entity: &str,
    warehouse: &WarehouseConfig,
    options: CastOptions,
) -> Result<String> {
    let xml = fs::read_to_string(metadata_path)
        .with_context(|| format!("Failed to read {}", metadata_path.display()))?;
    let descriptor = metadata::parse_metadata(entity, &xml)?;
    let plan = plan(&descriptor, warehouse)?;

    let insert = create_insert_select(
        &plan.tables.final_table,
        &final_schema(&descriptor),
        &plan.tables.staging,
        &staging_schema(&descriptor),
        options,
    )?;

    let sections = [
        ("final table", plan.create_final.as_str()),
        ("refined table", plan.create_refined.as_str()),
        ("staging table", plan.create_staging.as_str()),
        ("staging to final", insert.as_str()),
        ("daily merge", plan.merge.as_str()),
    ];
    Ok(sections
        .iter()
        .map(|(title, sql)| format!("-- {}\n{}\n", title, sql))
        .collect::<Vec<_>>()
        .join("\n"))
}
