//! Crawl pipeline: search, bounded image fetches, bulk persist, cache fill.

use std::sync::Arc;
use std::time::Duration;

use newsfeed_core::domain::{Article, NewsQuery};
use newsfeed_core::ports::{ArticleRepository, CrawlError, Crawler};

use crate::cache::TieredCache;
use crate::concurrency::{ConcurrencyLimiter, DEFAULT_MAX_CONCURRENT, FetchTask, RunOptions};

/// Tiered cache of crawl results, keyed by query fingerprint.
pub type ArticleCache = TieredCache<Vec<Article>, CrawlError>;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Image fetches allowed in flight at once.
    pub max_concurrent: usize,
    /// Deadline for a single image fetch.
    pub task_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            task_timeout: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            max_concurrent: std::env::var("CRAWL_MAX_CONCURRENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENT),
            task_timeout: std::env::var("CRAWL_TASK_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&s: &u64| s > 0)
                .map(Duration::from_secs),
        }
    }
}

/// Serves article queries from the caches and crawls on a miss.
pub struct CrawlOrchestrator {
    crawler: Arc<dyn Crawler>,
    articles: Arc<dyn ArticleRepository>,
    cache: Arc<ArticleCache>,
    limiter: ConcurrencyLimiter,
    config: OrchestratorConfig,
}

impl CrawlOrchestrator {
    pub fn new(
        crawler: Arc<dyn Crawler>,
        articles: Arc<dyn ArticleRepository>,
        cache: Arc<ArticleCache>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            crawler,
            articles,
            cache,
            limiter: ConcurrencyLimiter::new(),
            config,
        }
    }

    /// Cached read path. Concurrent misses for one query crawl once.
    pub async fn articles(&self, query: &NewsQuery) -> Result<Vec<Article>, CrawlError> {
        self.cache
            .get_or_compute(&query.fingerprint(), || self.crawl(query))
            .await
    }

    /// Crawl now and replace whatever the caches hold for this query.
    ///
    /// The caches are only touched once the batch has been persisted. Readers
    /// that miss while the crawl runs wait for it rather than crawling again.
    pub async fn refresh(&self, query: &NewsQuery) -> Result<Vec<Article>, CrawlError> {
        self.cache
            .refresh(&query.fingerprint(), || self.crawl(query))
            .await
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    async fn crawl(&self, query: &NewsQuery) -> Result<Vec<Article>, CrawlError> {
        let mut stubs = self.crawler.search(query).await?;
        stubs.truncate(query.limit());

        let (positions, tasks): (Vec<usize>, Vec<_>) = stubs
            .iter()
            .enumerate()
            .filter_map(|(i, stub)| {
                let source = stub.image_source.clone()?;
                let crawler = Arc::clone(&self.crawler);
                let task = FetchTask::new(stub.url.clone(), move || async move {
                    crawler.fetch_image(&source).await
                });
                Some((i, task))
            })
            .unzip();

        let options = RunOptions {
            max_concurrent: self.config.max_concurrent,
            task_timeout: self.config.task_timeout,
            abort_on_failure: false,
        };
        let fetched = self.limiter.run_with(tasks, options).await;

        let mut images: Vec<Option<String>> = vec![None; stubs.len()];
        for (pos, result) in positions.into_iter().zip(fetched) {
            match result {
                Ok(url) => images[pos] = Some(url),
                Err(e) => tracing::warn!(
                    article = %stubs[pos].url,
                    error = %e,
                    "Image fetch failed, keeping article without image"
                ),
            }
        }

        let articles: Vec<Article> = stubs
            .into_iter()
            .zip(images)
            .map(|(stub, image)| Article::from_stub(stub, image))
            .collect();

        let saved = self.articles.save_batch(&articles).await?;
        tracing::info!(
            query = %query.fingerprint(),
            articles = articles.len(),
            saved,
            "Crawl complete"
        );

        Ok(articles)
    }
}
