//! HTTP crawler client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;

use newsfeed_core::domain::{ArticleStub, NewsQuery};
use newsfeed_core::ports::{CrawlError, Crawler};

/// Crawler service configuration.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Base URL of the crawler service (e.g., http://localhost:9000)
    pub base_url: String,
    /// Timeout for each upstream request
    pub timeout: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl CrawlerConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("CRAWLER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            timeout: Duration::from_secs(
                std::env::var("CRAWLER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    articles: Vec<ArticleStub>,
}

/// Crawler backed by an HTTP search API.
///
/// `GET {base}/search?q=<keywords>&limit=<n>` returns `{"articles": [...]}`;
/// images are resolved with a `HEAD` request against their source.
pub struct HttpCrawler {
    client: Client,
    base_url: String,
}

impl HttpCrawler {
    pub fn new(config: CrawlerConfig) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CrawlError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env() -> Result<Self, CrawlError> {
        Self::new(CrawlerConfig::from_env())
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.base_url)
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn search(&self, query: &NewsQuery) -> Result<Vec<ArticleStub>, CrawlError> {
        let terms = query.keywords().join(" ");
        let limit = query.limit().to_string();

        tracing::debug!(q = %terms, limit = %limit, "Searching crawler");

        let response = self
            .client
            .get(self.search_url())
            .query(&[("q", terms.as_str()), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| CrawlError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| CrawlError::Request(e.to_string()))?;

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| CrawlError::InvalidResponse(e.to_string()))?;

        Ok(body.articles)
    }

    async fn fetch_image(&self, source: &str) -> Result<String, CrawlError> {
        let response = self
            .client
            .head(source)
            .send()
            .await
            .map_err(|e| CrawlError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| CrawlError::Request(e.to_string()))?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if !content_type.starts_with("image/") {
            return Err(CrawlError::InvalidResponse(format!(
                "{source} is not an image ({content_type})"
            )));
        }

        // Redirects are followed; serve the final location.
        Ok(response.url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_url_strips_trailing_slash() {
        let crawler = HttpCrawler::new(CrawlerConfig {
            base_url: "http://crawler.internal:9000/".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        assert_eq!(crawler.search_url(), "http://crawler.internal:9000/search");
    }

    #[test]
    fn test_search_response_decodes_stubs() {
        let body = r#"{"articles":[{
            "title": "Cashew prices climb",
            "source": "Market Wire",
            "url": "https://example.com/cashew",
            "published_at": "2024-05-01T08:00:00Z",
            "image_source": "https://img.example.com/cashew.jpg"
        }]}"#;

        let parsed: SearchResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.articles.len(), 1);
        assert_eq!(
            parsed.articles[0].image_source.as_deref(),
            Some("https://img.example.com/cashew.jpg")
        );
        assert!(parsed.articles[0].tags.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_request_error() {
        let crawler = HttpCrawler::new(CrawlerConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        let query = NewsQuery::new(["cashew"], 5).unwrap();
        assert!(matches!(
            crawler.search(&query).await,
            Err(CrawlError::Request(_))
        ));
        assert!(matches!(
            crawler.fetch_image("http://127.0.0.1:1/cashew.jpg").await,
            Err(CrawlError::Request(_))
        ));
    }
}
