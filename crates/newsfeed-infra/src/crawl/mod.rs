//! Crawling: the upstream HTTP client and the pipeline that feeds the caches.

mod http;
mod orchestrator;

pub use http::{CrawlerConfig, HttpCrawler};
pub use orchestrator::{ArticleCache, CrawlOrchestrator, OrchestratorConfig};
