//! Weekly rankings scraper.
//!
//! Serves the men's and women's ranking tables from a cache and re-scrapes
//! both of them concurrently once the cached snapshot goes stale.

mod macros;

pub mod cache;
pub mod clock;
pub mod config;
mod error;
pub mod model;
pub mod parse;
pub mod process;
pub mod render;
pub mod request;
pub mod resolve;
pub mod staleness;

pub use error::{Error, Result};

use std::time::Duration;

/// Object key the snapshot is cached under.
const CACHE_KEY: &str = "rankings.json";
/// Default cache directory, under the system temp dir.
const CACHE_DIR_NAME: &str = "rankings_scrape";
const CONTENT_TYPE_JSON: &str = "application/json";
const CACHE_CONTROL: &str = "public, max-age=3600";

/// Every ranking row lives under this selector on the source pages.
const ROW_SELECTOR: &str = "#content tbody tr.rrow";
const SELECTOR_TIMEOUT: Duration = Duration::from_secs(15);
/// How often `wait_for_selector` re-loads a page that doesn't match yet.
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Covers resolution, both extractions and the cache write.
const DEADLINE: Duration = Duration::from_secs(60);
/// Upper bound on the slice of `DEADLINE` held back for the cache write.
const WRITE_RESERVE: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TTL_SECS: i64 = 3600;
const WEEK_SECS: i64 = 604_800;

const MEN_URL_TEMPLATE: &str =
    "https://www.ittf.com/wp-content/uploads/2025/02/{year}_{week}_SEN_MS.html";
const WOMEN_URL_TEMPLATE: &str =
    "https://www.ittf.com/wp-content/uploads/2025/02/{year}_{week}_SEN_WS.html";
const INDEX_URL: &str = "https://www.ittf.com/rankings/";
const MEN_LINK_MARKER: &str = "SEN_MS";
const WOMEN_LINK_MARKER: &str = "SEN_WS";
