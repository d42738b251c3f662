use std::time::Duration;

use chrono::Utc;
use tokio::task::spawn_blocking;
use tracing::warn;

use crate::model::{Category, RankingRecord};
use crate::render::{Page, Renderer, Row, WaitPolicy};
use crate::{info_time, Result};

/// What an extraction pass looks for and how long it waits for it.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub row_selector: String,
    pub wait: WaitPolicy,
    pub selector_timeout: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            row_selector: crate::ROW_SELECTOR.to_string(),
            wait: WaitPolicy::default(),
            selector_timeout: crate::SELECTOR_TIMEOUT,
        }
    }
}

/// Loads `url`, waits for the ranking rows and turns every well-formed row
/// into a record. Malformed rows are dropped; a missing table is a `Timeout`.
/// No retries.
pub async fn extract_category(
    renderer: &dyn Renderer,
    category: Category,
    url: &str,
    opts: &ExtractOptions,
) -> Result<Vec<RankingRecord>> {
    let start_time = Utc::now();

    let mut page = renderer.load_page(url, opts.wait).await?;
    renderer
        .wait_for_selector(&mut page, &opts.row_selector, opts.selector_timeout)
        .await?;

    let records = parse_page(page, opts.row_selector.clone(), category).await?;
    info_time!(
        start_time,
        "Extracted {} {} records from {}",
        records.len(),
        category,
        url
    );
    Ok(records)
}

/// HTML parsing is CPU bound, so it runs on the blocking pool.
async fn parse_page(page: Page, row_selector: String, category: Category) -> Result<Vec<RankingRecord>> {
    let records = spawn_blocking(move || -> Result<Vec<RankingRecord>> {
        let rows = page.query_rows(&row_selector)?;
        Ok(records_from_rows(&rows, category))
    })
    .await??;

    Ok(records)
}

/// Keeps row order; rows that fail to parse are logged and skipped.
pub fn records_from_rows(rows: &[Row], category: Category) -> Vec<RankingRecord> {
    rows.iter()
        .enumerate()
        .filter_map(|(idx, row)| match parse_row(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%category, row = idx + 1, error = %e, "dropping malformed row");
                None
            }
        })
        .collect()
}

fn parse_row(row: &Row) -> Result<RankingRecord> {
    Ok(RankingRecord {
        rank: row.read_cell(1)?.to_string(),
        name: row.read_cell(2)?.to_string(),
        assoc: row.read_cell(3)?.to_string(),
        points: row.read_cell(4)?.to_string(),
    })
}
