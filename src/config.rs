use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::parse::ExtractOptions;
use crate::request::RenderBackend;
use crate::resolve::UrlResolver;
use crate::staleness::{self, StalenessPolicy};
use crate::{Error, Result};

/// Everything the orchestrator needs to know. `Default` carries the
/// production values; `from_env` lets the binary override them.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_key: String,
    /// Defaults to `rankings_scrape` under the system temp dir. `None` keeps
    /// the cache in memory, which only lasts for one run of the binary.
    pub cache_dir: Option<PathBuf>,
    pub cache_control: String,
    pub staleness: StalenessPolicy,
    pub resolver: UrlResolver,
    pub extract: ExtractOptions,
    pub render_backend: RenderBackend,
    /// Bounds the whole run. Each extraction gets its own cut of it, minus
    /// a reserve kept back for the cache write.
    pub deadline: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_key: crate::CACHE_KEY.to_string(),
            cache_dir: Some(std::env::temp_dir().join(crate::CACHE_DIR_NAME)),
            cache_control: crate::CACHE_CONTROL.to_string(),
            staleness: StalenessPolicy::default(),
            resolver: UrlResolver::default(),
            extract: ExtractOptions::default(),
            render_backend: RenderBackend::default(),
            deadline: crate::DEADLINE,
        }
    }
}

impl Config {
    /// Reads `RANKINGS_*` and `BROWSERLESS_*` overrides, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|name| std::env::var(name).ok())?;
        config.log_summary();
        Ok(config)
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(key) = var("RANKINGS_CACHE_KEY") {
            config.cache_key = key;
        }
        // Set but empty means in-memory.
        if let Some(dir) = var("RANKINGS_CACHE_DIR") {
            config.cache_dir = (!dir.trim().is_empty()).then(|| PathBuf::from(dir));
        }
        if let Some(raw) = var("RANKINGS_STALENESS") {
            config.staleness = staleness::parse_policy(&raw)?;
        }
        if let Some(secs) = var("RANKINGS_DEADLINE_SECS") {
            config.deadline = parse_secs("RANKINGS_DEADLINE_SECS", &secs)?;
        }
        if let Some(secs) = var("RANKINGS_SELECTOR_TIMEOUT_SECS") {
            config.extract.selector_timeout = parse_secs("RANKINGS_SELECTOR_TIMEOUT_SECS", &secs)?;
        }

        match var("RANKINGS_RESOLVER").as_deref() {
            None | Some("computed") => {}
            Some("discovery") => {
                let index_url =
                    var("RANKINGS_INDEX_URL").unwrap_or_else(|| crate::INDEX_URL.to_string());
                config.resolver = UrlResolver::discovery(index_url);
            }
            Some(other) => return Err(Error::Config(format!("RANKINGS_RESOLVER `{other}`"))),
        }

        if let Some(base_url) = var("BROWSERLESS_URL") {
            config.render_backend = RenderBackend::Browserless {
                base_url,
                token: var("BROWSERLESS_TOKEN"),
            };
        }

        Ok(config)
    }

    fn log_summary(&self) {
        let backend = match &self.render_backend {
            RenderBackend::Direct => "direct",
            RenderBackend::Browserless { .. } => "browserless",
        };
        info!(
            cache_key = %self.cache_key,
            cache_dir = ?self.cache_dir,
            staleness = ?self.staleness,
            resolver = ?self.resolver,
            backend,
            deadline_secs = self.deadline.as_secs(),
            "loaded config"
        );
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| Error::Config(format!("{name} `{raw}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.cache_key, "rankings.json");
        assert_eq!(config.extract.selector_timeout, Duration::from_secs(15));
        assert_eq!(config.resolver, UrlResolver::default());
        assert_eq!(config.render_backend, RenderBackend::Direct);
    }

    #[test]
    fn overrides_apply() {
        let config = Config::from_lookup(lookup(&[
            ("RANKINGS_STALENESS", "weekday:Tuesday"),
            ("RANKINGS_RESOLVER", "discovery"),
            ("RANKINGS_INDEX_URL", "https://example.com/index"),
            ("RANKINGS_DEADLINE_SECS", "90"),
            ("BROWSERLESS_URL", "http://chrome:3000"),
        ]))
        .unwrap();
        assert_eq!(config.staleness, StalenessPolicy::weekly(Weekday::Tue));
        assert_eq!(config.resolver, UrlResolver::discovery("https://example.com/index"));
        assert_eq!(config.deadline, Duration::from_secs(90));
        assert!(matches!(
            config.render_backend,
            RenderBackend::Browserless { token: None, .. }
        ));
    }

    #[test]
    fn cache_dir_defaults_to_disk() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(
            config.cache_dir,
            Some(std::env::temp_dir().join("rankings_scrape"))
        );

        let config = Config::from_lookup(lookup(&[("RANKINGS_CACHE_DIR", "/var/cache/rankings")])).unwrap();
        assert_eq!(config.cache_dir, Some(PathBuf::from("/var/cache/rankings")));

        let config = Config::from_lookup(lookup(&[("RANKINGS_CACHE_DIR", "")])).unwrap();
        assert_eq!(config.cache_dir, None);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("RANKINGS_RESOLVER", "guess")])).is_err());
        assert!(Config::from_lookup(lookup(&[("RANKINGS_DEADLINE_SECS", "soon")])).is_err());
    }
}
