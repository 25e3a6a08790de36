//! Cloud Storage JSON API client and bulk helpers

use std::fs;
use std::path::Path;

use rayon::prelude::*;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::{ObjectStore, UploadItem};
use crate::error::IngestError;
use crate::http::{check_status, read_json, send_with_retry, RetryPolicy};

const STORAGE_API: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_API: &str = "https://storage.googleapis.com/upload/storage/v1";

/// A single bucket, authenticated with a bearer token
pub struct GcsBucket {
    http: Client,
    bucket: String,
    access_token: String,
    retry: RetryPolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

impl GcsBucket {
    pub fn new(http: Client, bucket: &str, access_token: &str, retry: RetryPolicy) -> Self {
        Self {
            http,
            bucket: bucket.to_string(),
            access_token: access_token.to_string(),
            retry,
        }
    }

    /// `.../b/{bucket}/o` with the remaining path segments appended
    fn objects_url(&self, base: &str, object_name: Option<&str>) -> Result<Url, IngestError> {
        let mut url = Url::parse(base).map_err(|e| IngestError::ConfigError {
            message: format!("invalid storage URL {}: {}", base, e),
        })?;
        url.path_segments_mut()
            .map_err(|_| IngestError::ConfigError {
                message: format!("storage URL {} cannot take a path", base),
            })?
            .extend(["b", self.bucket.as_str(), "o"])
            .extend(object_name);
        Ok(url)
    }
}

impl ObjectStore for GcsBucket {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn upload(&self, path: &Path, object_name: &str) -> Result<(), IngestError> {
        let bytes = fs::read(path).map_err(|e| IngestError::LocalReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut url = self.objects_url(UPLOAD_API, None)?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", object_name);
        let url = url.to_string();

        let response = send_with_retry(self.retry, &url, || {
            self.http
                .post(&url)
                .bearer_auth(&self.access_token)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(bytes.clone())
        })?;
        check_status(&url, response)?;
        debug!(bucket = %self.bucket, object = object_name, "uploaded object");
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, IngestError> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.objects_url(STORAGE_API, None)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }
            let url = url.to_string();

            let response = send_with_retry(self.retry, &url, || {
                self.http.get(&url).bearer_auth(&self.access_token)
            })?;
            let response = check_status(&url, response)?;
            let listing: ObjectList = read_json(&url, response)?;

            names.extend(listing.items.into_iter().map(|item| item.name));
            match listing.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(names)
    }

    fn delete(&self, object_name: &str) -> Result<bool, IngestError> {
        let url = self.objects_url(STORAGE_API, Some(object_name))?.to_string();
        let response = send_with_retry(self.retry, &url, || {
            self.http.delete(&url).bearer_auth(&self.access_token)
        })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(&url, response)?;
        Ok(true)
    }
}

/// Upload files on a pool of `workers` threads.
///
/// Every file is attempted; if any fails the whole batch is an `UploadError`.
pub fn upload_many(
    store: &dyn ObjectStore,
    items: &[UploadItem],
    workers: usize,
) -> Result<usize, IngestError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| IngestError::ConfigError {
            message: format!("failed to start upload pool: {}", e),
        })?;

    let results: Vec<Result<(), IngestError>> = pool.install(|| {
        items
            .par_iter()
            .map(|item| store.upload(&item.path, &item.object_name))
            .collect()
    });

    let mut failed = 0;
    for (item, result) in items.iter().zip(&results) {
        if let Err(e) = result {
            failed += 1;
            warn!(object = %item.object_name, error = %e, "upload failed");
        }
    }

    if failed > 0 {
        return Err(IngestError::UploadError {
            bucket: store.bucket().to_string(),
            failed,
            total: items.len(),
        });
    }

    info!(bucket = store.bucket(), files = items.len(), "uploaded page files");
    Ok(items.len())
}

/// Delete every object under `prefix`, logging instead of failing.
///
/// Returns the number of objects removed.
pub fn delete_prefix(store: &dyn ObjectStore, prefix: &str) -> usize {
    let names = match store.list(prefix) {
        Ok(names) => names,
        Err(e) => {
            warn!(bucket = store.bucket(), prefix, error = %e, "could not list objects for cleanup");
            return 0;
        }
    };

    let mut deleted = 0;
    for name in &names {
        match store.delete(name) {
            Ok(true) => deleted += 1,
            Ok(false) => debug!(object = %name, "object already gone"),
            Err(e) => warn!(object = %name, error = %e, "could not delete object"),
        }
    }
    info!(bucket = store.bucket(), prefix, deleted, "removed uploaded objects");
    deleted
}
