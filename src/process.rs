//! Top-level scrape flow: serve the cached snapshot while it's fresh,
//! otherwise resolve this week's URLs, scrape both categories concurrently and
//! write the result through to the cache.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::config::Config;
use crate::model::{Category, CategoryOutcome, Response, Snapshot};
use crate::parse::{extract_category, ExtractOptions};
use crate::render::Renderer;
use crate::resolve::SourceUrls;
use crate::{info_time, Error, Result};

/// Where a run ended up.
#[derive(Debug)]
pub enum Outcome {
    /// The cache was fresh; nothing was scraped.
    ServedCached(Snapshot),
    /// Fresh scrape, written through to the cache.
    Persisted(Snapshot),
    /// Fresh scrape that couldn't be written. Still served.
    WriteFailed { snapshot: Snapshot, error: Error },
    /// Both categories came back empty or failed. The cache is untouched.
    NoData {
        men: CategoryOutcome,
        women: CategoryOutcome,
    },
    HardFailure(Error),
}

impl Outcome {
    pub fn into_response(self, cache_control: &str) -> Response {
        let (snapshot, cache_status, write_failed) = match self {
            Outcome::ServedCached(snapshot) => (snapshot, "HIT", false),
            Outcome::Persisted(snapshot) => (snapshot, "MISS", false),
            Outcome::WriteFailed { snapshot, .. } => (snapshot, "MISS", true),
            Outcome::NoData { .. } => return Response::no_data(),
            Outcome::HardFailure(e) => return Response::error(e),
        };

        let resp = match Response::ok(&snapshot) {
            Ok(resp) => resp,
            Err(e) => return Response::error(e),
        };
        let resp = resp
            .with_header("Cache-Control", cache_control)
            .with_header("X-Cache", cache_status);
        if write_failed {
            resp.with_header("X-Cache-Write", "failed")
        } else {
            resp
        }
    }
}

pub struct Orchestrator {
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl Orchestrator {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        config: Config,
    ) -> Self {
        Self {
            renderer,
            store,
            clock,
            config,
        }
    }

    /// Runs once and renders the outcome as a response envelope.
    pub async fn handle(&self) -> Response {
        self.run().await.into_response(&self.config.cache_control)
    }

    pub async fn run(&self) -> Outcome {
        let start_time = Utc::now();
        let now = self.clock.now();
        let deadline = Instant::now() + self.config.deadline;
        let key = self.config.cache_key.as_str();

        let check = self.config.staleness.check(&*self.store, key, now);
        let stale = match within(deadline, "checking the cache", check).await {
            Ok(stale) => stale,
            Err(e) => {
                error!(key, error = %e, "cache lookup failed");
                return Outcome::HardFailure(e);
            }
        };

        if !stale {
            match within(deadline, "reading the cache", self.read_cached()).await {
                Ok(snapshot) => {
                    info_time!(start_time, "Served cached rankings from `{}`", key);
                    return Outcome::ServedCached(snapshot);
                }
                Err(e) => warn!(key, error = %e, "cached snapshot unreadable, refreshing"),
            }
        }

        let outcome = self.refresh(now, deadline).await;
        info_time!(start_time, "Finished refreshing rankings");
        outcome
    }

    async fn refresh(&self, now: DateTime<Utc>, deadline: Instant) -> Outcome {
        let resolve = self.config.resolver.resolve(&*self.renderer, now);
        let urls = match within(deadline, "resolving source urls", resolve).await {
            Ok(urls) => urls,
            Err(e) => {
                error!(error = %e, "couldn't resolve ranking urls");
                return Outcome::HardFailure(e);
            }
        };
        info!(men = %urls.men, women = %urls.women, "scraping rankings");

        // Leave part of the budget for the write so a slow category can't starve it.
        let write_reserve = (self.config.deadline / 10).min(crate::WRITE_RESERVE);
        let (men, women) = self.extract_both(&urls, deadline - write_reserve).await;

        if !men.has_records() && !women.has_records() {
            warn!(?men, ?women, "No rankings found, leaving cache untouched");
            return Outcome::NoData { men, women };
        }

        let snapshot = Snapshot::from_outcomes(men, women);
        match within(deadline, "writing the cache", self.write_through(&snapshot)).await {
            Ok(()) => Outcome::Persisted(snapshot),
            Err(error) => {
                error!(error = %error, "scraped rankings couldn't be cached");
                Outcome::WriteFailed { snapshot, error }
            }
        }
    }

    /// Both categories run concurrently and are both awaited; one failing
    /// or running out of time doesn't cancel the other. Each loads its own page.
    async fn extract_both(
        &self,
        urls: &SourceUrls,
        deadline: Instant,
    ) -> (CategoryOutcome, CategoryOutcome) {
        let mut opts = self.config.extract.clone();
        opts.selector_timeout = opts
            .selector_timeout
            .min(deadline.saturating_duration_since(Instant::now()));

        tokio::join!(
            self.extract_one(Category::Men, urls, &opts, deadline),
            self.extract_one(Category::Women, urls, &opts, deadline),
        )
    }

    async fn extract_one(
        &self,
        category: Category,
        urls: &SourceUrls,
        opts: &ExtractOptions,
        deadline: Instant,
    ) -> CategoryOutcome {
        let url = urls.get(category);
        let extract = extract_category(&*self.renderer, category, url, opts);
        match within(deadline, "extracting rankings", extract).await {
            Ok(records) => {
                let outcome = CategoryOutcome::from_records(records);
                if !outcome.has_records() {
                    warn!(%category, url, "category came back empty");
                }
                outcome
            }
            Err(e) => {
                warn!(%category, url, error = %e, "category extraction failed");
                CategoryOutcome::Failed(e.to_string())
            }
        }
    }

    async fn read_cached(&self) -> Result<Snapshot> {
        let key = &self.config.cache_key;
        let bytes = self.store.get(key).await.map_err(|source| Error::CacheLookup {
            key: key.clone(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write_through(&self, snapshot: &Snapshot) -> Result<()> {
        let key = &self.config.cache_key;
        let bytes = serde_json::to_vec(snapshot)?;
        self.store
            .put(key, bytes, crate::CONTENT_TYPE_JSON, Some(&self.config.cache_control))
            .await
            .map_err(|source| Error::CacheWrite {
                key: key.clone(),
                source,
            })?;
        info!(
            key = %key,
            men = snapshot.men.len(),
            women = snapshot.women.len(),
            "cached new rankings snapshot"
        );
        Ok(())
    }
}

async fn within<T>(
    deadline: Instant,
    stage: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| Error::DeadlineExceeded(stage))?
}
