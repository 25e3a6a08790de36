//! Blocking SuccessFactors OData client

use reqwest::blocking::Client;
use url::Url;

use crate::config::SuccessFactorsConfig;
use crate::error::IngestError;
use crate::http::{check_status, read_json, send_with_retry, truncate, RetryPolicy};

use super::paging::{Envelope, ODataSource, Page, PageRequest};

/// Client for the `$metadata`, `$count` and collection endpoints
pub struct ODataClient {
    http: Client,
    base_url: String,
    user: String,
    password: String,
    retry: RetryPolicy,
}

impl ODataClient {
    pub fn new(http: Client, config: &SuccessFactorsConfig, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user: config.user.clone(),
            password: config.password.clone(),
            retry,
        }
    }

    pub fn metadata_url(&self, entity: &str) -> String {
        format!("{}/{}/$metadata", self.base_url, entity)
    }

    pub fn count_url(&self, entity: &str) -> String {
        format!("{}/{}/$count", self.base_url, entity)
    }

    /// First page of a collection: snapshot paging, JSON format.
    pub fn collection_url(&self, entity: &str, select: &[String]) -> Result<String, IngestError> {
        let raw = format!("{}/{}", self.base_url, entity);
        let mut url = Url::parse(&raw).map_err(|e| IngestError::ConfigError {
            message: format!("invalid OData URL {}: {}", raw, e),
        })?;
        {
            let mut query = url.query_pairs_mut();
            if !select.is_empty() {
                query.append_pair("$select", &select.join(","));
            }
            query.append_pair("paging", "snapshot");
            query.append_pair("$format", "json");
        }
        Ok(url.into())
    }

    fn get_text(&self, url: &str) -> Result<String, IngestError> {
        let response = send_with_retry(self.retry, url, || {
            self.http
                .get(url)
                .basic_auth(&self.user, Some(&self.password))
        })?;
        let response = check_status(url, response)?;
        response.text().map_err(|e| IngestError::HttpError {
            url: url.to_string(),
            source: e,
        })
    }
}

impl ODataSource for ODataClient {
    fn metadata(&self, entity: &str) -> Result<String, IngestError> {
        self.get_text(&self.metadata_url(entity))
    }

    fn count(&self, entity: &str) -> Result<u64, IngestError> {
        let url = self.count_url(entity);
        let text = self.get_text(&url)?;
        text.trim()
            .parse::<u64>()
            .map_err(|_| IngestError::UnexpectedResponse {
                url,
                message: format!("expected a row count, got: {}", truncate(&text, 200)),
            })
    }

    fn page(&self, request: &PageRequest) -> Result<Page, IngestError> {
        let url = match request {
            PageRequest::First { entity, select } => self.collection_url(entity, select)?,
            PageRequest::Next(url) => url.clone(),
        };

        let response = send_with_retry(self.retry, &url, || {
            self.http
                .get(&url)
                .basic_auth(&self.user, Some(&self.password))
        })?;
        let response = check_status(&url, response)?;
        let envelope: Envelope = read_json(&url, response)?;

        envelope.d.ok_or_else(|| IngestError::UnexpectedResponse {
            url,
            message: "response has no \"d\" member".to_string(),
        })
    }
}
