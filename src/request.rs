use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::render::{Page, Renderer, WaitPolicy};
use crate::{Error, Result};

/// Where page HTML comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RenderBackend {
    /// Plain GET, no script execution.
    #[default]
    Direct,
    /// A Browserless-style `/content` endpoint that renders the page in a
    /// headless browser and answers with the resulting HTML.
    Browserless {
        base_url: String,
        token: Option<String>,
    },
}

/// Loads pages over HTTP, either directly or through a headless-browser service.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
    backend: RenderBackend,
}

impl HttpRenderer {
    pub fn new(client: Client, backend: RenderBackend) -> Self {
        Self { client, backend }
    }

    /// Builds a client with the default request timeout.
    pub fn with_backend(backend: RenderBackend) -> Result<Self> {
        let client = Client::builder().timeout(crate::REQUEST_TIMEOUT).build()?;
        Ok(Self::new(client, backend))
    }

    /// Requests a page and returns its HTML.
    async fn request_page_html(&self, url: &str, wait: WaitPolicy) -> Result<String> {
        let res = match &self.backend {
            RenderBackend::Direct => self.client.get(url).send().await?,
            RenderBackend::Browserless { base_url, token } => {
                let mut endpoint = format!("{}/content", base_url.trim_end_matches('/'));
                if let Some(token) = token {
                    endpoint.push_str(&format!("?token={token}"));
                }
                let body = serde_json::json!({
                    "url": url,
                    "gotoOptions": { "waitUntil": wait.as_str() },
                });
                self.client.post(&endpoint).json(&body).send().await?
            }
        };

        let status = res.status();
        if !status.is_success() {
            let message = res.text().await.unwrap_or_default();
            return Err(Error::RenderApi {
                url: url.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        let html = res.text().await?;
        Ok(html)
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn load_page(&self, url: &str, wait: WaitPolicy) -> Result<Page> {
        debug!(url, wait = wait.as_str(), "loading page");
        let html = self.request_page_html(url, wait).await?;
        Ok(Page::new(url, wait, html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn direct_backend_gets_the_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ranking.html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hi</p>"))
            .mount(&server)
            .await;

        let renderer = HttpRenderer::with_backend(RenderBackend::Direct).unwrap();
        let url = format!("{}/ranking.html", server.uri());
        let page = renderer.load_page(&url, WaitPolicy::Load).await.unwrap();
        assert_eq!(page.url(), url);
        assert!(page.matches("p").unwrap());
    }

    #[tokio::test]
    async fn non_success_status_is_a_render_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("gone"))
            .mount(&server)
            .await;

        let renderer = HttpRenderer::with_backend(RenderBackend::Direct).unwrap();
        let err = renderer
            .load_page(&format!("{}/missing.html", server.uri()), WaitPolicy::Load)
            .await
            .unwrap_err();
        match err {
            Error::RenderApi { status, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(message, "gone");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn browserless_backend_posts_url_and_wait_policy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/content"))
            .and(query_param("token", "secret"))
            .and(body_partial_json(serde_json::json!({
                "url": "https://example.com/r.html",
                "gotoOptions": { "waitUntil": "networkidle2" },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("<table></table>"))
            .expect(1)
            .mount(&server)
            .await;

        let renderer = HttpRenderer::with_backend(RenderBackend::Browserless {
            base_url: format!("{}/", server.uri()),
            token: Some("secret".into()),
        })
        .unwrap();
        let page = renderer
            .load_page("https://example.com/r.html", WaitPolicy::NetworkIdle2)
            .await
            .unwrap();
        assert_eq!(page.url(), "https://example.com/r.html");
        assert!(page.matches("table").unwrap());
    }
}
