//! Works out which two pages hold this week's rankings.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{info, warn};
use url::Url;

use crate::model::Category;
use crate::render::{Renderer, WaitPolicy};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUrls {
    pub men: String,
    pub women: String,
}

impl SourceUrls {
    pub fn get(&self, category: Category) -> &str {
        match category {
            Category::Men => &self.men,
            Category::Women => &self.women,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlResolver {
    /// Fills `{year}` and `{week}` into a fixed template per category. No I/O.
    Computed {
        men_template: String,
        women_template: String,
    },
    /// Loads an index page and picks the first link whose `href` contains the
    /// category's marker.
    Discovery {
        index_url: String,
        men_marker: String,
        women_marker: String,
    },
}

impl Default for UrlResolver {
    fn default() -> Self {
        UrlResolver::Computed {
            men_template: crate::MEN_URL_TEMPLATE.to_string(),
            women_template: crate::WOMEN_URL_TEMPLATE.to_string(),
        }
    }
}

impl UrlResolver {
    pub fn discovery(index_url: impl Into<String>) -> Self {
        UrlResolver::Discovery {
            index_url: index_url.into(),
            men_marker: crate::MEN_LINK_MARKER.to_string(),
            women_marker: crate::WOMEN_LINK_MARKER.to_string(),
        }
    }

    pub async fn resolve(&self, renderer: &dyn Renderer, now: DateTime<Utc>) -> Result<SourceUrls> {
        match self {
            UrlResolver::Computed {
                men_template,
                women_template,
            } => Ok(SourceUrls {
                men: fill_template(men_template, now),
                women: fill_template(women_template, now),
            }),
            UrlResolver::Discovery {
                index_url,
                men_marker,
                women_marker,
            } => discover(renderer, index_url, men_marker, women_marker).await,
        }
    }
}

/// `ceil((day_of_year + weekday_of_dec_31 + 1) / 7)`, weekday counted from Sunday = 0.
pub fn week_number(now: DateTime<Utc>) -> u32 {
    let day = now.ordinal();
    let start_weekday = NaiveDate::from_ymd_opt(now.year() - 1, 12, 31)
        .map(|d| d.weekday().num_days_from_sunday())
        .unwrap_or(0);
    (day + start_weekday + 1).div_ceil(7)
}

fn fill_template(template: &str, now: DateTime<Utc>) -> String {
    template
        .replace("{year}", &now.year().to_string())
        .replace("{week}", &week_number(now).to_string())
}

async fn discover(
    renderer: &dyn Renderer,
    index_url: &str,
    men_marker: &str,
    women_marker: &str,
) -> Result<SourceUrls> {
    let base = Url::parse(index_url)?;
    let page = renderer.load_page(index_url, WaitPolicy::Load).await?;
    let links = page.links("a[href]").await?;

    let find = |category: Category, marker: &str| -> Result<String> {
        let href = links
            .iter()
            .find(|href| href.contains(marker))
            .ok_or_else(|| {
                warn!(%category, marker, index_url, "no ranking link on index page");
                Error::ResolutionFailure(category)
            })?;
        Ok(base.join(href)?.to_string())
    };

    let urls = SourceUrls {
        men: find(Category::Men, men_marker)?,
        women: find(Category::Women, women_marker)?,
    };
    info!(men = %urls.men, women = %urls.women, "discovered ranking urls");
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Page;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    #[test]
    fn week_numbers() {
        // 2024-12-31 was a Tuesday.
        assert_eq!(week_number(at(2025, 1, 1)), 1);
        assert_eq!(week_number(at(2025, 1, 4)), 1);
        assert_eq!(week_number(at(2025, 1, 5)), 2);
        assert_eq!(week_number(at(2025, 2, 11)), 7);
        // 2025-12-31 was a Wednesday.
        assert_eq!(week_number(at(2026, 10, 19)), 43);
    }

    #[tokio::test]
    async fn computed_urls_need_no_io() {
        let resolver = UrlResolver::default();
        let urls = resolver.resolve(&NoPages, at(2025, 2, 11)).await.unwrap();
        assert_eq!(
            urls.men,
            "https://www.ittf.com/wp-content/uploads/2025/02/2025_7_SEN_MS.html"
        );
        assert_eq!(
            urls.get(Category::Women),
            "https://www.ittf.com/wp-content/uploads/2025/02/2025_7_SEN_WS.html"
        );
    }

    struct NoPages;

    #[async_trait]
    impl Renderer for NoPages {
        async fn load_page(&self, url: &str, _: WaitPolicy) -> Result<Page> {
            panic!("unexpected load of {url}")
        }
    }

    struct Index(&'static str);

    #[async_trait]
    impl Renderer for Index {
        async fn load_page(&self, url: &str, wait: WaitPolicy) -> Result<Page> {
            Ok(Page::new(url, wait, self.0))
        }
    }

    #[tokio::test]
    async fn discovery_joins_relative_links() {
        let renderer = Index(
            r#"<a href="/news">News</a>
               <a href="/uploads/2025_7_SEN_MS.html">Men's singles</a>
               <a href="https://cdn.example.com/2025_7_SEN_WS.html">Women's singles</a>"#,
        );
        let urls = UrlResolver::discovery("https://www.ittf.com/rankings/")
            .resolve(&renderer, at(2025, 2, 11))
            .await
            .unwrap();
        assert_eq!(urls.men, "https://www.ittf.com/uploads/2025_7_SEN_MS.html");
        assert_eq!(urls.women, "https://cdn.example.com/2025_7_SEN_WS.html");
    }

    #[tokio::test]
    async fn discovery_fails_when_a_category_link_is_missing() {
        let renderer = Index(r#"<a href="/uploads/2025_7_SEN_MS.html">Men's singles</a>"#);
        let err = UrlResolver::discovery("https://www.ittf.com/rankings/")
            .resolve(&renderer, at(2025, 2, 11))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResolutionFailure(Category::Women)));
    }
}
