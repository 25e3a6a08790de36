//! Sequential page-follow over an OData collection

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::IngestError;

/// One row of an OData JSON result
pub type Row = Map<String, Value>;

/// Body of `{ "d": { "results": [...], "__next": "..." } }`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub results: Vec<Row>,
    #[serde(rename = "__next", default)]
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope {
    pub d: Option<Page>,
}

/// Which page to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// The first page of an entity collection, selecting the given columns
    First { entity: String, select: Vec<String> },
    /// A continuation link taken from `__next`
    Next(String),
}

/// Source of entity metadata and row pages
pub trait ODataSource {
    /// Raw `$metadata` document for an entity
    fn metadata(&self, entity: &str) -> Result<String, IngestError>;

    /// Row count reported by `$count`
    fn count(&self, entity: &str) -> Result<u64, IngestError>;

    fn page(&self, request: &PageRequest) -> Result<Page, IngestError>;
}

/// Totals from a page-follow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    pub pages: usize,
    pub rows: usize,
}

/// Follow `__next` links until the last page, handing each page to `on_page`.
///
/// Stops with `PageLimitExceeded` rather than fetching more than
/// `max_pages` pages.
pub fn fetch_all_pages<S, F>(
    source: &S,
    entity: &str,
    select: &[String],
    max_pages: usize,
    mut on_page: F,
) -> Result<PageStats, IngestError>
where
    S: ODataSource + ?Sized,
    F: FnMut(usize, Vec<Row>) -> Result<(), IngestError>,
{
    let mut request = PageRequest::First {
        entity: entity.to_string(),
        select: select.to_vec(),
    };
    let mut stats = PageStats::default();

    loop {
        if stats.pages >= max_pages {
            return Err(IngestError::PageLimitExceeded {
                entity: entity.to_string(),
                max_pages,
            });
        }

        let page = source.page(&request)?;
        info!(page = stats.pages, rows = page.results.len(), "fetched page");

        stats.rows += page.results.len();
        on_page(stats.pages, page.results)?;
        stats.pages += 1;

        match page.next {
            Some(next) if !next.is_empty() => request = PageRequest::Next(next),
            _ => break,
        }
    }

    Ok(stats)
}
