use async_trait::async_trait;

use crate::domain::Article;
use crate::error::RepoError;

/// Durable article storage.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Write a whole batch as one operation.
    ///
    /// Either every article is stored or none is. Returns the number written.
    async fn save_batch(&self, articles: &[Article]) -> Result<usize, RepoError>;

    /// Total number of stored articles.
    async fn count(&self) -> Result<u64, RepoError>;
}
