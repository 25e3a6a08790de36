use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sfsf_ingest::config::{
    HttpConfig, IngestConfig, LocalPaths, PipelineConfig, StorageConfig, SuccessFactorsConfig,
    WarehouseConfig,
};
use sfsf_ingest::sql::CastOptions;
use sfsf_ingest::{ingest, render};

#[derive(Parser)]
#[command(name = "sfsf-ingest")]
#[command(author, version, about = "Ingest SAP SuccessFactors entities into BigQuery")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an entity, load it into BigQuery and schedule the daily merge
    Ingest {
        /// OData entity name, e.g. EmpJob
        #[arg(short, long)]
        entity: String,

        #[command(flatten)]
        warehouse: WarehouseArgs,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        storage: StorageArgs,

        /// Enable debug logging, including generated SQL
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the statements synthesized from a local $metadata file
    Render {
        /// Path to the $metadata XML document
        #[arg(short, long)]
        metadata: PathBuf,

        /// Entity described by the document
        #[arg(short, long)]
        entity: String,

        #[command(flatten)]
        warehouse: WarehouseArgs,
    },
}

#[derive(Args)]
struct WarehouseArgs {
    /// Project holding the staging and final tables
    #[arg(long, env = "PROJECT_ID")]
    project: String,

    /// Project holding the refined tables
    #[arg(long, env = "RF_PROJECT_ID")]
    refined_project: String,

    #[arg(long, env = "BQ_LOCATION", default_value = "US")]
    location: String,

    #[arg(long, default_value = "ds_sfsf")]
    dataset_prefix: String,

    /// Use the historical BYTES conversion expression
    #[arg(long)]
    legacy_bytes_cast: bool,
}

#[derive(Args)]
struct SourceArgs {
    /// SuccessFactors OData base URL, e.g. https://api19.sapsf.com/odata/v2
    #[arg(long, env = "SSFF_BASE_URL")]
    base_url: String,

    #[arg(long, env = "SSFF_USER")]
    user: String,

    #[arg(long, env = "SSFF_PASSWORD", hide_env_values = true)]
    password: String,

    /// Page-follow limit per entity
    #[arg(long, default_value_t = 10_000)]
    max_pages: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    #[arg(long, default_value_t = 3)]
    max_retries: u32,
}

#[derive(Args)]
struct StorageArgs {
    #[arg(long, env = "TEMP_BUCKET")]
    temp_bucket: String,

    #[arg(long, env = "PIPELINES_BUCKET")]
    pipelines_bucket: String,

    #[arg(long, default_value_t = 8)]
    upload_workers: usize,

    /// Connection reference of the SuccessFactors source in the pipeline
    #[arg(long, env = "SSFF_CONNECTION_ID")]
    connection_id: String,

    #[arg(long, default_value = "${conn(BigQuery-Raw)}")]
    sink_connection: String,

    /// Pipeline template replacing the built-in one
    #[arg(long)]
    pipeline_template: Option<PathBuf>,

    /// Service account the scheduled merge runs as
    #[arg(long, env = "BQ_SQ_SA")]
    scheduler_service_account: Option<String>,

    #[arg(long, default_value = "every day 14:30")]
    schedule: String,

    #[arg(long, env = "GOOGLE_OAUTH_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    #[arg(long, default_value = "metadata")]
    metadata_dir: PathBuf,

    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    #[arg(long, default_value = "out")]
    out_dir: PathBuf,
}

impl WarehouseArgs {
    fn config(&self, scheduling: Option<&StorageArgs>) -> WarehouseConfig {
        WarehouseConfig {
            project: self.project.clone(),
            refined_project: self.refined_project.clone(),
            location: self.location.clone(),
            dataset_prefix: self.dataset_prefix.clone(),
            scheduler_service_account: scheduling
                .and_then(|s| s.scheduler_service_account.clone()),
            schedule: scheduling.map(|s| s.schedule.clone()).unwrap_or_default(),
            access_token: scheduling
                .map(|s| s.access_token.clone())
                .unwrap_or_default(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "sfsf_ingest=debug,info"
    } else {
        "sfsf_ingest=info,warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest {
            entity,
            warehouse,
            source,
            storage,
            verbose,
        } => {
            init_logging(verbose);

            let config = IngestConfig {
                successfactors: SuccessFactorsConfig {
                    base_url: source.base_url.clone(),
                    user: source.user.clone(),
                    password: source.password.clone(),
                },
                warehouse: warehouse.config(Some(&storage)),
                storage: StorageConfig {
                    temp_bucket: storage.temp_bucket.clone(),
                    pipelines_bucket: storage.pipelines_bucket.clone(),
                    upload_workers: storage.upload_workers,
                },
                pipeline: PipelineConfig {
                    connection_id: storage.connection_id.clone(),
                    sink_connection: storage.sink_connection.clone(),
                    template_path: storage.pipeline_template.clone(),
                },
                paths: LocalPaths {
                    metadata_dir: storage.metadata_dir.clone(),
                    data_dir: storage.data_dir.clone(),
                    out_dir: storage.out_dir.clone(),
                },
                http: HttpConfig {
                    timeout: Duration::from_secs(source.timeout_secs),
                    max_retries: source.max_retries,
                    max_pages: source.max_pages,
                    ..HttpConfig::default()
                },
                legacy_bytes_cast: warehouse.legacy_bytes_cast,
            };

            let report = ingest(&config, &entity)?;
            info!(
                entity = %report.entity,
                pages = report.pages,
                rows_loaded = report.rows_loaded,
                scheduled_query = %report.scheduled_query,
                "ingestion complete"
            );
        }
        Commands::Render {
            metadata,
            entity,
            warehouse,
        } => {
            init_logging(false);

            let sql = render(
                &metadata,
                &entity,
                &warehouse.config(None),
                CastOptions {
                    legacy_bytes_cast: warehouse.legacy_bytes_cast,
                },
            )?;
            print!("{}", sql);
        }
    }

    Ok(())
}
