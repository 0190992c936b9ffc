use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::SiteSettings;
use crate::error::ScrapeError;

/// Retrieves the HTML of a search results page.
///
/// `Ok(None)` means no content came back; callers treat that as zero
/// results rather than an error.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, term: &str) -> Result<Option<String>, ScrapeError>;
}

/// Plain HTTP GET against the site's search path. One attempt, no retry.
pub struct StaticFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl StaticFetcher {
    pub fn new(site: &SiteSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(site.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            base_url: site.base_url.clone(),
        })
    }

    pub fn search_url(&self, term: &str) -> String {
        format!("{}/s?k={}", self.base_url, urlencoding::encode(term))
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    async fn fetch(&self, term: &str) -> Result<Option<String>, ScrapeError> {
        let url = self.search_url(term);
        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url = %url, error = %e, "error fetching page");
                return Ok(None);
            }
        };

        let status = resp.status();
        info!(url = %url, status = status.as_u16(), "fetched search page");
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "search page returned non-success status");
            return Ok(None);
        }

        match resp.text().await {
            Ok(html) => Ok(Some(html)),
            Err(e) => {
                warn!(url = %url, error = %e, "error reading page body");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, http::HeaderMap, http::StatusCode, routing::get, Router};
    use std::collections::HashMap;

    fn site(base_url: String) -> SiteSettings {
        SiteSettings {
            base_url,
            user_agent: "test-agent/1.0".to_string(),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn search_url_encodes_term() {
        let fetcher = StaticFetcher::new(&site("https://shop.example".into())).unwrap();
        assert_eq!(
            fetcher.search_url("Pencil Case & more"),
            "https://shop.example/s?k=Pencil%20Case%20%26%20more"
        );
    }

    #[tokio::test]
    async fn returns_body_with_query_and_user_agent() {
        let app = Router::new().route(
            "/s",
            get(|Query(q): Query<HashMap<String, String>>, headers: HeaderMap| async move {
                let agent = headers
                    .get("user-agent")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                format!("k={} ua={}", q.get("k").cloned().unwrap_or_default(), agent)
            }),
        );
        let base = serve(app).await;

        let fetcher = StaticFetcher::new(&site(base)).unwrap();
        let body = fetcher.fetch("pencil case").await.unwrap();
        assert_eq!(body.as_deref(), Some("k=pencil case ua=test-agent/1.0"));
    }

    #[tokio::test]
    async fn non_success_status_is_no_content() {
        let app = Router::new().route("/s", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "blocked") }));
        let base = serve(app).await;

        let fetcher = StaticFetcher::new(&site(base)).unwrap();
        assert_eq!(fetcher.fetch("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreachable_host_is_no_content() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = StaticFetcher::new(&site(format!("http://{}", addr))).unwrap();
        assert_eq!(fetcher.fetch("anything").await.unwrap(), None);
    }
}
