use std::time::Duration;

use thiserror::Error;

use crate::cache::CacheError;
use crate::model::Category;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Timed out after {timeout:?} waiting for selector `{selector}` on {url}")]
    Timeout {
        url: String,
        selector: String,
        timeout: Duration,
    },

    #[error("Couldn't resolve a source URL for the {0} rankings, the index page may have changed.")]
    ResolutionFailure(Category),

    #[error("Cache lookup failed for key `{key}`: {source}")]
    CacheLookup {
        key: String,
        #[source]
        source: CacheError,
    },
    #[error("Cache write failed for key `{key}`: {source}")]
    CacheWrite {
        key: String,
        #[source]
        source: CacheError,
    },

    #[error("No rankings found")]
    NoData,

    #[error("Deadline exceeded while {0}")]
    DeadlineExceeded(&'static str),

    #[error("The selector you are trying to scrape for is invalid. Selector: {0}")]
    ParseMissingSelector(String),
    #[error("Row is missing cell {0}")]
    MissingCell(usize),

    #[error("Render backend answered {status} for {url}: {message}")]
    RenderApi {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Url Error: {0}")]
    Url(#[from] url::ParseError),
}
