//! Decides whether the cached snapshot has to be refreshed before serving.

use chrono::{DateTime, Datelike, Duration, Utc, Weekday};
use tracing::debug;

use crate::cache::{CacheError, CacheMeta, CacheStore};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessPolicy {
    /// Stale once the object is older than `ttl`.
    FixedTtl { ttl: Duration },
    /// On `refresh_day` anything written before today's UTC midnight is stale.
    /// Every other day falls back to the `ttl` check.
    WeekdayAware { refresh_day: Weekday, ttl: Duration },
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        StalenessPolicy::FixedTtl {
            ttl: Duration::seconds(crate::TTL_SECS),
        }
    }
}

impl StalenessPolicy {
    pub fn weekly(refresh_day: Weekday) -> Self {
        StalenessPolicy::WeekdayAware {
            refresh_day,
            ttl: Duration::seconds(crate::WEEK_SECS),
        }
    }

    /// No metadata means nothing was ever written, which is always stale.
    pub fn is_stale(&self, meta: Option<&CacheMeta>, now: DateTime<Utc>) -> bool {
        let Some(meta) = meta else {
            return true;
        };
        let last = meta.last_modified;

        match *self {
            StalenessPolicy::FixedTtl { ttl } => now - last > ttl,
            StalenessPolicy::WeekdayAware { refresh_day, ttl } => {
                if now.weekday() == refresh_day {
                    last < start_of_day(now)
                } else {
                    now - last > ttl
                }
            }
        }
    }

    /// Looks up `key` and applies the policy. A missing object is stale, any
    /// other lookup failure is an error.
    pub async fn check(&self, store: &dyn CacheStore, key: &str, now: DateTime<Utc>) -> Result<bool> {
        let meta = match store.head(key).await {
            Ok(meta) => Some(meta),
            Err(CacheError::NotFound) => None,
            Err(source) => {
                return Err(Error::CacheLookup {
                    key: key.to_string(),
                    source,
                })
            }
        };
        let stale = self.is_stale(meta.as_ref(), now);
        debug!(
            key,
            stale,
            last_modified = ?meta.map(|m| m.last_modified),
            "evaluated cache staleness"
        );
        Ok(stale)
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

/// Parses `ttl:<secs>` or `weekday:<day>`.
pub fn parse_policy(raw: &str) -> Result<StalenessPolicy> {
    let bad = || Error::Config(format!("staleness policy `{raw}`"));
    let (kind, value) = raw.split_once(':').ok_or_else(bad)?;
    match kind.trim() {
        "ttl" => {
            let secs: i64 = value.trim().parse().map_err(|_| bad())?;
            if secs < 0 {
                return Err(bad());
            }
            Ok(StalenessPolicy::FixedTtl {
                ttl: Duration::seconds(secs),
            })
        }
        "weekday" => {
            let day: Weekday = value.trim().parse().map_err(|_| bad())?;
            Ok(StalenessPolicy::weekly(day))
        }
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::clock::FixedClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn meta(last_modified: DateTime<Utc>) -> CacheMeta {
        CacheMeta {
            last_modified,
            content_type: "application/json".into(),
            cache_control: None,
        }
    }

    fn hourly() -> StalenessPolicy {
        StalenessPolicy::FixedTtl {
            ttl: Duration::seconds(3600),
        }
    }

    #[test]
    fn missing_metadata_is_always_stale() {
        let now = at(2025, 2, 12, 9, 0);
        assert!(hourly().is_stale(None, now));
        assert!(StalenessPolicy::weekly(Weekday::Tue).is_stale(None, now));
    }

    #[test]
    fn fixed_ttl_boundaries() {
        let now = at(2025, 2, 12, 9, 0);
        let policy = hourly();
        assert!(!policy.is_stale(Some(&meta(now - Duration::minutes(10))), now));
        assert!(!policy.is_stale(Some(&meta(now - Duration::seconds(3600))), now));
        assert!(policy.is_stale(Some(&meta(now - Duration::seconds(3601))), now));
        assert!(policy.is_stale(Some(&meta(now - Duration::days(3))), now));
    }

    #[test]
    fn refresh_day_invalidates_anything_before_midnight() {
        // 2025-02-11 is a Tuesday.
        let now = at(2025, 2, 11, 0, 30);
        let policy = StalenessPolicy::weekly(Weekday::Tue);

        // Only 40 minutes old, but written yesterday.
        assert!(policy.is_stale(Some(&meta(at(2025, 2, 10, 23, 50))), now));
        assert!(!policy.is_stale(Some(&meta(at(2025, 2, 11, 0, 5))), now));
    }

    #[test]
    fn other_days_use_weekly_ttl() {
        // Wednesday, written the Tuesday before: fresh.
        let now = at(2025, 2, 12, 9, 0);
        let policy = StalenessPolicy::weekly(Weekday::Tue);
        assert!(!policy.is_stale(Some(&meta(at(2025, 2, 11, 1, 0))), now));
        assert!(policy.is_stale(Some(&meta(now - Duration::days(8))), now));
    }

    #[test]
    fn parses_policies() {
        assert_eq!(parse_policy("ttl:604800").unwrap(), StalenessPolicy::FixedTtl {
            ttl: Duration::seconds(604_800)
        });
        assert_eq!(
            parse_policy("weekday:tue").unwrap(),
            StalenessPolicy::weekly(Weekday::Tue)
        );
        assert!(parse_policy("ttl:-5").is_err());
        assert!(parse_policy("hourly").is_err());
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn put(&self, _: &str, _: Vec<u8>, _: &str, _: Option<&str>) -> std::result::Result<(), CacheError> {
            Err(CacheError::Backend("down".into()))
        }
        async fn get(&self, _: &str) -> std::result::Result<Vec<u8>, CacheError> {
            Err(CacheError::Backend("down".into()))
        }
        async fn head(&self, _: &str) -> std::result::Result<CacheMeta, CacheError> {
            Err(CacheError::Backend("down".into()))
        }
    }

    #[tokio::test]
    async fn not_found_is_stale_but_backend_errors_propagate() {
        let now = at(2025, 2, 12, 9, 0);
        let store = MemoryStore::new(Arc::new(FixedClock(now)));
        assert!(hourly().check(&store, "rankings.json", now).await.unwrap());

        store
            .insert_at("rankings.json", b"{}".to_vec(), now - Duration::minutes(10))
            .await;
        assert!(!hourly().check(&store, "rankings.json", now).await.unwrap());

        let err = hourly().check(&BrokenStore, "rankings.json", now).await.unwrap_err();
        assert!(matches!(err, Error::CacheLookup { .. }));
    }
}
