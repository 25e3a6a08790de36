//! Blocking HTTP plumbing shared by the OData and cloud clients

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use tracing::warn;

use crate::config::HttpConfig;
use crate::error::IngestError;

/// Bounded retry with a fixed backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.retry_backoff,
        }
    }
}

/// Build the blocking client every service shares.
pub fn build_client(config: &HttpConfig) -> Result<Client, IngestError> {
    Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| IngestError::HttpError {
            url: String::new(),
            source: e,
        })
}

/// Status codes worth another attempt
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Send a request, retrying connection failures, 429 and 5xx.
///
/// `build` is called once per attempt. Any other status is returned to the
/// caller as-is so it can treat e.g. 404 or 409 as an outcome.
pub fn send_with_retry<F>(policy: RetryPolicy, url: &str, build: F) -> Result<Response, IngestError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        match build().send() {
            Ok(response) if is_retryable_status(response.status()) && attempt < policy.max_retries => {
                warn!(
                    url,
                    status = response.status().as_u16(),
                    attempt = attempt + 1,
                    "retrying request"
                );
            }
            Ok(response) => return Ok(response),
            Err(e) if (e.is_connect() || e.is_timeout()) && attempt < policy.max_retries => {
                warn!(url, error = %e, attempt = attempt + 1, "retrying request");
            }
            Err(e) => {
                return Err(IngestError::HttpError {
                    url: url.to_string(),
                    source: e,
                })
            }
        }
        attempt += 1;
        thread::sleep(policy.backoff);
    }
}

/// Turn a non-success response into an error carrying the body.
pub fn check_status(url: &str, response: Response) -> Result<Response, IngestError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(IngestError::HttpStatusError {
        url: url.to_string(),
        status: status.as_u16(),
        body: truncate(&body, 2000),
    })
}

/// Read a response body as JSON.
pub fn read_json<T: serde::de::DeserializeOwned>(
    url: &str,
    response: Response,
) -> Result<T, IngestError> {
    let text = response.text().map_err(|e| IngestError::HttpError {
        url: url.to_string(),
        source: e,
    })?;
    serde_json::from_str(&text).map_err(|e| IngestError::UnexpectedResponse {
        url: url.to_string(),
        message: format!("{}: {}", e, truncate(&text, 500)),
    })
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
