//! BigQuery v2 and Data Transfer REST client

use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::{QueryOutcome, ScheduledQuery, Warehouse};
use crate::error::IngestError;
use crate::http::{check_status, read_json, send_with_retry, RetryPolicy};
use crate::model::{ColumnSchema, DatasetRef, TableRef};

const BIGQUERY_API: &str = "https://bigquery.googleapis.com/bigquery/v2";
const TRANSFER_API: &str = "https://bigquerydatatransfer.googleapis.com/v1";

/// Server-side wait per `getQueryResults` call
const QUERY_WAIT_MS: u64 = 10_000;

/// Jobs run in `project` and `location`
pub struct BigQueryClient {
    http: Client,
    project: String,
    location: String,
    access_token: String,
    retry: RetryPolicy,
    job_timeout: Duration,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: bool,
    /// int64 values arrive as JSON strings
    num_dml_affected_rows: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    status: JobStatus,
    #[serde(default)]
    statistics: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct TableResource {
    schema: Option<TableSchema>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<ColumnSchema>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferConfig {
    name: String,
    #[serde(default)]
    display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferConfigList {
    #[serde(default)]
    transfer_configs: Vec<TransferConfig>,
    next_page_token: Option<String>,
}

impl BigQueryClient {
    pub fn new(
        http: Client,
        project: &str,
        location: &str,
        access_token: &str,
        retry: RetryPolicy,
        job_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            http,
            project: project.to_string(),
            location: location.to_string(),
            access_token: access_token.to_string(),
            retry,
            job_timeout,
            poll_interval,
        }
    }

    fn dataset_url(dataset: &DatasetRef) -> String {
        format!(
            "{}/projects/{}/datasets/{}",
            BIGQUERY_API, dataset.project, dataset.dataset
        )
    }

    fn table_url(table: &TableRef) -> String {
        format!(
            "{}/tables/{}",
            Self::dataset_url(&table.dataset_ref()),
            table.table
        )
    }

    fn get(&self, url: &str) -> Result<Response, IngestError> {
        send_with_retry(self.retry, url, || {
            self.http.get(url).bearer_auth(&self.access_token)
        })
    }

    fn post(&self, url: &str, body: &Value) -> Result<Response, IngestError> {
        send_with_retry(self.retry, url, || {
            self.http
                .post(url)
                .bearer_auth(&self.access_token)
                .json(body)
        })
    }

    fn deadline_error(&self, job_id: &str) -> IngestError {
        IngestError::JobError {
            job_id: job_id.to_string(),
            message: format!("not done after {}s", self.job_timeout.as_secs()),
        }
    }

    /// Poll `jobs.get` until the job is DONE.
    fn wait_for_job(&self, job_id: &str) -> Result<JobResource, IngestError> {
        let mut url = Url::parse(&format!(
            "{}/projects/{}/jobs/{}",
            BIGQUERY_API, self.project, job_id
        ))
        .map_err(|e| IngestError::ConfigError {
            message: format!("invalid job URL: {}", e),
        })?;
        url.query_pairs_mut().append_pair("location", &self.location);
        let url = url.to_string();

        let deadline = Instant::now() + self.job_timeout;
        loop {
            let response = check_status(&url, self.get(&url)?)?;
            let job: JobResource = read_json(&url, response)?;

            if job.status.state == "DONE" {
                if let Some(error) = &job.status.error_result {
                    return Err(IngestError::JobError {
                        job_id: job_id.to_string(),
                        message: error.message.clone(),
                    });
                }
                return Ok(job);
            }
            if Instant::now() >= deadline {
                return Err(self.deadline_error(job_id));
            }
            debug!(job_id, state = %job.status.state, "waiting for job");
            thread::sleep(self.poll_interval);
        }
    }

    fn query_results_url(&self, job_id: &str) -> Result<String, IngestError> {
        let mut url = Url::parse(&format!(
            "{}/projects/{}/queries/{}",
            BIGQUERY_API, self.project, job_id
        ))
        .map_err(|e| IngestError::ConfigError {
            message: format!("invalid query URL: {}", e),
        })?;
        url.query_pairs_mut()
            .append_pair("location", &self.location)
            .append_pair("timeoutMs", &QUERY_WAIT_MS.to_string())
            .append_pair("maxResults", "0");
        Ok(url.into())
    }

    fn transfer_configs_url(&self, project: &str) -> Result<Url, IngestError> {
        Url::parse(&format!(
            "{}/projects/{}/locations/{}/transferConfigs",
            TRANSFER_API,
            project,
            self.location.to_lowercase()
        ))
        .map_err(|e| IngestError::ConfigError {
            message: format!("invalid transfer URL: {}", e),
        })
    }

    /// Resource name of the scheduled query already registered under
    /// `request.display_name`, if any.
    fn find_scheduled_query(&self, request: &ScheduledQuery) -> Result<Option<String>, IngestError> {
        let base = self.transfer_configs_url(&request.project)?;
        let mut page_token: Option<String> = None;
        loop {
            let mut url = base.clone();
            url.query_pairs_mut()
                .append_pair("dataSourceIds", "scheduled_query");
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }
            let url = url.to_string();

            let response = send_with_retry(self.retry, &url, || {
                self.http
                    .get(&url)
                    .bearer_auth(&self.access_token)
                    .header("x-goog-user-project", &request.project)
            })?;
            let list: TransferConfigList = read_json(&url, check_status(&url, response)?)?;
            if let Some(found) = find_transfer_config(&list.transfer_configs, &request.display_name) {
                return Ok(Some(found.name.clone()));
            }
            match list.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(None),
            }
        }
    }
}

/// `jobs.query` body. The server deduplicates on `requestId`, so a retried
/// request returns the job of the first attempt.
fn query_request(sql: &str, location: &str) -> Value {
    json!({
        "query": sql,
        "useLegacySql": false,
        "location": location,
        "timeoutMs": QUERY_WAIT_MS,
        "maxResults": 0,
        "requestId": Uuid::new_v4().to_string(),
    })
}

/// Check a `jobs.insert` response. Returns false when a job with the same id
/// already exists, i.e. an earlier attempt reached the server.
fn accept_job_insert(url: &str, response: Response) -> Result<bool, IngestError> {
    if response.status() == StatusCode::CONFLICT {
        return Ok(false);
    }
    check_status(url, response)?;
    Ok(true)
}

fn parse_count(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.parse().ok())
}

fn first_error(errors: &[ErrorProto]) -> Option<String> {
    errors.first().map(|e| e.message.clone())
}

impl Warehouse for BigQueryClient {
    fn ensure_dataset(&self, dataset: &DatasetRef) -> Result<bool, IngestError> {
        let url = Self::dataset_url(dataset);
        let response = self.get(&url)?;
        if response.status().is_success() {
            debug!(dataset = %dataset, "dataset exists");
            return Ok(false);
        }
        if response.status() != StatusCode::NOT_FOUND {
            check_status(&url, response)?;
        }

        let insert_url = format!("{}/projects/{}/datasets", BIGQUERY_API, dataset.project);
        let body = json!({
            "datasetReference": {
                "projectId": dataset.project,
                "datasetId": dataset.dataset,
            },
            "location": self.location,
        });
        let response = self.post(&insert_url, &body)?;
        if response.status() == StatusCode::CONFLICT {
            debug!(dataset = %dataset, "dataset created concurrently");
            return Ok(false);
        }
        check_status(&insert_url, response)?;
        info!(dataset = %dataset, "created dataset");
        Ok(true)
    }

    fn run_query(&self, sql: &str) -> Result<QueryOutcome, IngestError> {
        let url = format!("{}/projects/{}/queries", BIGQUERY_API, self.project);
        let body = query_request(sql, &self.location);
        debug!(sql, "running query");

        let response = check_status(&url, self.post(&url, &body)?)?;
        let mut result: QueryResponse = read_json(&url, response)?;
        let job_id = result
            .job_reference
            .as_ref()
            .map(|r| r.job_id.clone())
            .ok_or_else(|| IngestError::UnexpectedResponse {
                url: url.clone(),
                message: "query response has no job reference".to_string(),
            })?;

        let deadline = Instant::now() + self.job_timeout;
        while !result.job_complete {
            if Instant::now() >= deadline {
                return Err(self.deadline_error(&job_id));
            }
            let results_url = self.query_results_url(&job_id)?;
            let response = check_status(&results_url, self.get(&results_url)?)?;
            result = read_json(&results_url, response)?;
        }

        if let Some(message) = first_error(&result.errors) {
            return Err(IngestError::JobError { job_id, message });
        }

        Ok(QueryOutcome {
            job_id,
            affected_rows: parse_count(result.num_dml_affected_rows.as_deref()),
        })
    }

    fn load_json(
        &self,
        source_uri: &str,
        table: &TableRef,
        schema: &[ColumnSchema],
    ) -> Result<u64, IngestError> {
        let job_id = format!("sfsf_load_{}", Uuid::new_v4().simple());
        let url = format!("{}/projects/{}/jobs", BIGQUERY_API, self.project);
        let body = json!({
            "jobReference": {
                "projectId": self.project,
                "jobId": job_id,
                "location": self.location,
            },
            "configuration": {
                "load": {
                    "sourceUris": [source_uri],
                    "sourceFormat": "NEWLINE_DELIMITED_JSON",
                    "writeDisposition": "WRITE_APPEND",
                    "destinationTable": {
                        "projectId": table.project,
                        "datasetId": table.dataset,
                        "tableId": table.table,
                    },
                    "schema": { "fields": schema },
                }
            }
        });

        if accept_job_insert(&url, self.post(&url, &body)?)? {
            debug!(job_id = %job_id, source_uri, "submitted load job");
        } else {
            debug!(job_id = %job_id, source_uri, "load job already submitted");
        }

        let job = self.wait_for_job(&job_id)?;
        let rows = parse_count(job.statistics.pointer("/load/outputRows").and_then(Value::as_str))
            .unwrap_or(0);
        Ok(rows)
    }

    fn table_schema(&self, table: &TableRef) -> Result<Vec<ColumnSchema>, IngestError> {
        let url = Self::table_url(table);
        let response = check_status(&url, self.get(&url)?)?;
        let resource: TableResource = read_json(&url, response)?;
        Ok(resource.schema.map(|s| s.fields).unwrap_or_default())
    }

    fn delete_table(&self, table: &TableRef) -> Result<bool, IngestError> {
        let url = Self::table_url(table);
        let response = send_with_retry(self.retry, &url, || {
            self.http.delete(&url).bearer_auth(&self.access_token)
        })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(&url, response)?;
        Ok(true)
    }

    fn schedule_query(&self, request: &ScheduledQuery) -> Result<String, IngestError> {
        let params = json!({ "query": request.query });

        if let Some(name) = self.find_scheduled_query(request)? {
            let mut url = Url::parse(&format!("{}/{}", TRANSFER_API, name)).map_err(|e| {
                IngestError::ConfigError {
                    message: format!("invalid transfer URL: {}", e),
                }
            })?;
            url.query_pairs_mut()
                .append_pair("updateMask", "params,schedule");
            if let Some(account) = &request.service_account {
                url.query_pairs_mut()
                    .append_pair("serviceAccountName", account);
            }
            let url = url.to_string();

            let body = json!({ "params": params, "schedule": request.schedule });
            let response = send_with_retry(self.retry, &url, || {
                self.http
                    .patch(&url)
                    .bearer_auth(&self.access_token)
                    .header("x-goog-user-project", &request.project)
                    .json(&body)
            })?;
            check_status(&url, response)?;
            info!(name = %name, "updated existing scheduled query");
            return Ok(name);
        }

        let mut url = self.transfer_configs_url(&request.project)?;
        if let Some(account) = &request.service_account {
            url.query_pairs_mut()
                .append_pair("serviceAccountName", account);
        }
        let url = url.to_string();

        let body = json!({
            "displayName": request.display_name,
            "dataSourceId": "scheduled_query",
            "params": params,
            "schedule": request.schedule,
        });
        let response = send_with_retry(self.retry, &url, || {
            self.http
                .post(&url)
                .bearer_auth(&self.access_token)
                .header("x-goog-user-project", &request.project)
                .json(&body)
        })?;
        let response = check_status(&url, response)?;
        let config: TransferConfig = read_json(&url, response)?;
        Ok(config.name)
    }
}

fn find_transfer_config<'a>(
    configs: &'a [TransferConfig],
    display_name: &str,
) -> Option<&'a TransferConfig> {
    configs.iter().find(|c| c.display_name == display_name)
}
