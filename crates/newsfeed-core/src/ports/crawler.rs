//! Crawler port - the expensive upstream the caches shield.

use async_trait::async_trait;

use crate::domain::{ArticleStub, NewsQuery};
use crate::error::RepoError;

/// External news crawler.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Search for articles matching the query, at most `query.limit()` of them.
    async fn search(&self, query: &NewsQuery) -> Result<Vec<ArticleStub>, CrawlError>;

    /// Fetch an article's lead image and return the URL it should be served from.
    async fn fetch_image(&self, source: &str) -> Result<String, CrawlError>;
}

/// Crawl pipeline errors.
///
/// Cloneable so that one failed crawl can be reported to every caller
/// waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CrawlError {
    #[error("Upstream request failed: {0}")]
    Request(String),

    #[error("Upstream returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("Persisting the batch failed: {0}")]
    Persistence(String),
}

impl From<RepoError> for CrawlError {
    fn from(err: RepoError) -> Self {
        CrawlError::Persistence(err.to_string())
    }
}
