//! The page-rendering surface the scraper depends on.
//!
//! A [`Renderer`] loads a URL into an owned [`Page`]; the DOM queries on `Page`
//! and [`Row`] are plain synchronous functions over the rendered HTML. Every
//! caller loads its own `Page`, so concurrent extractions never share one.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tokio::task::spawn_blocking;
use tokio::time::Instant;
use tracing::debug;

use crate::{Error, Result};

/// When a load counts as finished. Only meaningful for headless-browser backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    Load,
    NetworkIdle0,
    #[default]
    NetworkIdle2,
}

impl WaitPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            WaitPolicy::Load => "load",
            WaitPolicy::NetworkIdle0 => "networkidle0",
            WaitPolicy::NetworkIdle2 => "networkidle2",
        }
    }
}

/// A rendered document.
#[derive(Debug, Clone)]
pub struct Page {
    url: String,
    wait: WaitPolicy,
    html: Arc<String>,
}

impl Page {
    pub fn new(url: impl Into<String>, wait: WaitPolicy, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            wait,
            html: Arc::new(html.into()),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        self.wait
    }

    pub fn matches(&self, selector: &str) -> Result<bool> {
        let sel = create_selector(selector)?;
        let doc = Html::parse_document(&self.html);
        let found = doc.select(&sel).next().is_some();
        Ok(found)
    }

    /// [`Page::matches`] on the blocking pool, for callers on the runtime.
    pub async fn contains(&self, selector: &str) -> Result<bool> {
        let page = self.clone();
        let selector = selector.to_string();
        spawn_blocking(move || page.matches(&selector)).await?
    }

    /// All elements matching `selector`, each captured as its child elements.
    /// Only direct `<td>` children count as cells, so a nested table's cells
    /// never shift the positions.
    pub fn query_rows(&self, selector: &str) -> Result<Vec<Row>> {
        let row_sel = create_selector(selector)?;
        let doc = Html::parse_document(&self.html);

        let rows = doc
            .select(&row_sel)
            .map(|row| Row {
                cells: row
                    .children()
                    .filter_map(ElementRef::wrap)
                    .map(|child| (child.value().name() == "td").then(|| cell_text(child)))
                    .collect(),
            })
            .collect();
        Ok(rows)
    }

    /// `href` attributes of the elements matching `selector`, in document order.
    pub fn query_links(&self, selector: &str) -> Result<Vec<String>> {
        let sel = create_selector(selector)?;
        let doc = Html::parse_document(&self.html);
        let links = doc
            .select(&sel)
            .filter_map(|a| a.value().attr("href"))
            .map(str::to_string)
            .collect();
        Ok(links)
    }

    /// [`Page::query_links`] on the blocking pool.
    pub async fn links(&self, selector: &str) -> Result<Vec<String>> {
        let page = self.clone();
        let selector = selector.to_string();
        spawn_blocking(move || page.query_links(&selector)).await?
    }
}

/// One table row, detached from the document. Holds one slot per child
/// element; slots that aren't `<td>` are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<Option<String>>,
}

impl Row {
    pub fn new(cells: Vec<String>) -> Self {
        Self {
            cells: cells.into_iter().map(Some).collect(),
        }
    }

    /// Text of the cell at 1-based `index`, matching `td:nth-child(index)`.
    pub fn read_cell(&self, index: usize) -> Result<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.cells.get(i))
            .and_then(Option::as_deref)
            .ok_or(Error::MissingCell(index))
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn load_page(&self, url: &str, wait: WaitPolicy) -> Result<Page>;

    /// Re-loads `page` until `selector` matches or `timeout` runs out.
    async fn wait_for_selector(&self, page: &mut Page, selector: &str, timeout: Duration) -> Result<()> {
        let give_up = Instant::now() + timeout;
        let url = page.url().to_string();
        let timed_out = || Error::Timeout {
            url: url.clone(),
            selector: selector.to_string(),
            timeout,
        };

        loop {
            if page.contains(selector).await? {
                return Ok(());
            }
            if Instant::now() + crate::SELECTOR_POLL_INTERVAL >= give_up {
                return Err(timed_out());
            }
            tokio::time::sleep(crate::SELECTOR_POLL_INTERVAL).await;

            debug!(url = %url, selector, "selector missing, reloading page");
            let reload = self.load_page(&url, page.wait_policy());
            *page = match tokio::time::timeout_at(give_up, reload).await {
                Ok(reloaded) => reloaded?,
                Err(_) => return Err(timed_out()),
            };
        }
    }
}

#[inline]
pub(crate) fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::ParseMissingSelector(sel_str.into()))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}
