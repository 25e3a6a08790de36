//! SuccessFactors OData access

mod client;
mod paging;

pub use client::ODataClient;
pub use paging::{fetch_all_pages, ODataSource, Page, PageRequest, PageStats, Row};
