//! In-memory article repository, used when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use newsfeed_core::domain::Article;
use newsfeed_core::error::RepoError;
use newsfeed_core::ports::ArticleRepository;

/// Articles keyed by URL. A re-crawled article replaces the stored one.
#[derive(Default)]
pub struct InMemoryArticleRepository {
    articles: RwLock<HashMap<String, Article>>,
}

impl InMemoryArticleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn find_by_url(&self, url: &str) -> Option<Article> {
        self.articles.read().await.get(url).cloned()
    }
}

#[async_trait]
impl ArticleRepository for InMemoryArticleRepository {
    async fn save_batch(&self, articles: &[Article]) -> Result<usize, RepoError> {
        // Validate the whole batch before touching the map.
        if let Some(bad) = articles.iter().find(|a| a.url.trim().is_empty()) {
            return Err(RepoError::Constraint(format!(
                "article {} has no url",
                bad.id
            )));
        }

        let mut stored = self.articles.write().await;
        for article in articles {
            stored.insert(article.url.clone(), article.clone());
        }
        Ok(articles.len())
    }

    async fn count(&self) -> Result<u64, RepoError> {
        Ok(self.articles.read().await.len() as u64)
    }
}
