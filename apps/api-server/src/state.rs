//! Application state - shared across all handlers.

use std::io;
use std::sync::Arc;

use newsfeed_core::ports::{ArticleRepository, CacheTier, RateLimiter, TokenService};
use newsfeed_infra::auth::JwtTokenService;
use newsfeed_infra::cache::FileCache;
use newsfeed_infra::crawl::{ArticleCache, CrawlOrchestrator, HttpCrawler};
use newsfeed_infra::database::InMemoryArticleRepository;
use newsfeed_infra::rate_limit::InMemoryRateLimiter;

#[cfg(feature = "postgres")]
use newsfeed_infra::database::PostgresArticleRepository;

use crate::config::{AppConfig, RateLimitBackend};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CrawlOrchestrator>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub token_service: Arc<dyn TokenService>,
    pub articles: Arc<dyn ArticleRepository>,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    ///
    /// Optional backends (Redis, PostgreSQL) fall back to in-memory ones when
    /// they cannot be reached. Must run inside the server's runtime: the
    /// rate-limit sweeper is spawned here.
    pub async fn new(config: &AppConfig) -> io::Result<Self> {
        let rate_limiter = build_rate_limiter(config).await;
        let articles = build_article_repository(config).await;

        let fast = build_fast_tier(config).await?;
        let durable: Arc<dyn CacheTier> = Arc::new(FileCache::new(config.file_cache.clone()));
        tracing::info!(
            fast = fast.name(),
            durable = durable.name(),
            dir = %config.file_cache.dir.display(),
            "Cache tiers ready"
        );
        let cache = Arc::new(ArticleCache::new(fast, durable, config.cache.clone()));

        let crawler = HttpCrawler::new(config.crawler.clone()).map_err(io::Error::other)?;
        let orchestrator = Arc::new(CrawlOrchestrator::new(
            Arc::new(crawler),
            articles.clone(),
            cache,
            config.orchestrator.clone(),
        ));

        let token_service: Arc<dyn TokenService> =
            Arc::new(JwtTokenService::new(config.jwt.clone()));

        tracing::info!("Application state initialized");

        Ok(Self {
            orchestrator,
            rate_limiter,
            token_service,
            articles,
        })
    }
}

async fn build_rate_limiter(config: &AppConfig) -> Arc<dyn RateLimiter> {
    if config.rate_limit_backend == RateLimitBackend::Redis {
        #[cfg(feature = "redis")]
        {
            use newsfeed_infra::rate_limit::RedisRateLimiter;

            match RedisRateLimiter::new(config.redis.clone(), config.rate_limit.clone()).await {
                Ok(limiter) => return Arc::new(limiter),
                Err(e) => tracing::error!(
                    error = %e,
                    "Redis rate limiter unavailable, falling back to in-memory"
                ),
            }
        }

        #[cfg(not(feature = "redis"))]
        {
            tracing::warn!("RATE_LIMIT_BACKEND=redis requires the redis feature, using in-memory");
        }
    }

    tracing::info!(
        max_requests = config.rate_limit.max_requests,
        window_ms = config.rate_limit.window.as_millis() as u64,
        "In-memory rate limiter enabled"
    );
    Arc::new(InMemoryRateLimiter::new(config.rate_limit.clone()).with_sweeper())
}

#[cfg(feature = "redis")]
async fn build_fast_tier(config: &AppConfig) -> io::Result<Arc<dyn CacheTier>> {
    newsfeed_infra::cache::connect_fast_tier(config.redis.clone())
        .await
        .map_err(io::Error::other)
}

#[cfg(not(feature = "redis"))]
async fn build_fast_tier(_config: &AppConfig) -> io::Result<Arc<dyn CacheTier>> {
    Ok(Arc::new(newsfeed_infra::cache::InMemoryCache::new()))
}

async fn build_article_repository(config: &AppConfig) -> Arc<dyn ArticleRepository> {
    #[cfg(feature = "postgres")]
    {
        if let Some(db) = &config.database {
            match db.connect().await {
                Ok(conn) => return Arc::new(PostgresArticleRepository::new(conn)),
                Err(e) => tracing::error!(
                    error = %e,
                    "Failed to connect to database, using in-memory article store"
                ),
            }
        }
    }

    if config.database.is_none() {
        tracing::warn!("DATABASE_URL not set. Articles are kept in memory.");
    }
    Arc::new(InMemoryArticleRepository::new())
}
