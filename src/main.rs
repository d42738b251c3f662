use std::sync::Arc;

use rankings_scrape::cache;
use rankings_scrape::clock::{Clock, SystemClock};
use rankings_scrape::config::Config;
use rankings_scrape::process::Orchestrator;
use rankings_scrape::request::HttpRenderer;
use rankings_scrape::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rankings_scrape=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::from_env()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = cache::open_store(config.cache_dir.as_deref(), clock.clone());
    let renderer = Arc::new(HttpRenderer::with_backend(config.render_backend.clone())?);

    let orchestrator = Orchestrator::new(renderer, store, clock, config);
    let response = orchestrator.handle().await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.status_code >= 500 {
        std::process::exit(1);
    }
    Ok(())
}
