//! Scheduled cache warming using tokio-cron-scheduler.
//!
//! Each configured keyword set is re-crawled on a cron schedule so popular
//! queries are already in both cache tiers when readers ask for them.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use newsfeed_core::domain::{DEFAULT_LIMIT, NewsQuery};
use newsfeed_infra::crawl::CrawlOrchestrator;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Six-field cron expression, seconds first.
    pub cron: String,
    /// Keyword sets to refresh, one query each.
    pub queries: Vec<Vec<String>>,
    pub limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: "0 */15 * * * *".to_string(),
            queries: Vec::new(),
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SchedulerConfig {
    /// `NEWS_REFRESH_KEYWORDS` separates queries with `;` and keywords with
    /// `,`, e.g. `cashew,almonds;coffee`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("SCHEDULER_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.enabled),
            cron: std::env::var("NEWS_REFRESH_CRON").unwrap_or(defaults.cron),
            queries: std::env::var("NEWS_REFRESH_KEYWORDS")
                .map(|raw| parse_queries(&raw))
                .unwrap_or_default(),
            limit: std::env::var("NEWS_REFRESH_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.limit),
        }
    }

    /// Normalised queries; sets with no usable keyword are skipped.
    pub fn news_queries(&self) -> Vec<NewsQuery> {
        self.queries
            .iter()
            .filter_map(|keywords| match NewsQuery::new(keywords, self.limit) {
                Ok(query) => Some(query),
                Err(e) => {
                    tracing::warn!(keywords = ?keywords, error = %e, "Skipping refresh query");
                    None
                }
            })
            .collect()
    }
}

fn parse_queries(raw: &str) -> Vec<Vec<String>> {
    raw.split(';')
        .map(|set| set.split(',').map(|k| k.trim().to_string()).collect::<Vec<_>>())
        .filter(|set| set.iter().any(|k| !k.is_empty()))
        .collect()
}

/// Cron scheduler that refreshes cached news queries.
pub struct RefreshScheduler {
    inner: JobScheduler,
}

impl RefreshScheduler {
    /// Register one job per configured query and start ticking.
    ///
    /// Returns `None` when disabled or when there is nothing to refresh.
    pub async fn start(
        config: &SchedulerConfig,
        orchestrator: Arc<CrawlOrchestrator>,
    ) -> Result<Option<Self>, JobSchedulerError> {
        if !config.enabled {
            tracing::info!("Scheduler disabled");
            return Ok(None);
        }
        let queries = config.news_queries();
        if queries.is_empty() {
            tracing::info!("No refresh keywords configured, scheduler not started");
            return Ok(None);
        }

        let scheduler = Self {
            inner: JobScheduler::new().await?,
        };
        for query in queries {
            let orchestrator = orchestrator.clone();
            scheduler
                .add_cron(&config.cron, move || {
                    let orchestrator = orchestrator.clone();
                    let query = query.clone();
                    async move { refresh(&orchestrator, &query).await }
                })
                .await?;
        }

        scheduler.inner.start().await?;
        tracing::info!("Scheduler started");
        Ok(Some(scheduler))
    }

    async fn add_cron<F, Fut>(&self, schedule: &str, task: F) -> Result<uuid::Uuid, JobSchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let task = task.clone();
            Box::pin(async move {
                task().await;
            })
        })?;

        let id = self.inner.add(job).await?;
        tracing::info!(schedule = %schedule, job_id = %id, "Cron job registered");
        Ok(id)
    }

    /// Stop the scheduler.
    pub async fn shutdown(mut self) -> Result<(), JobSchedulerError> {
        self.inner.shutdown().await?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

async fn refresh(orchestrator: &CrawlOrchestrator, query: &NewsQuery) {
    match orchestrator.refresh(query).await {
        Ok(articles) => tracing::info!(
            query = %query.fingerprint(),
            articles = articles.len(),
            "Scheduled refresh complete"
        ),
        Err(e) => tracing::error!(
            query = %query.fingerprint(),
            error = %e,
            "Scheduled refresh failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_queries() {
        assert_eq!(
            parse_queries("cashew, almonds; coffee ;;"),
            vec![
                vec!["cashew".to_string(), "almonds".to_string()],
                vec!["coffee".to_string()],
            ]
        );
        assert!(parse_queries("").is_empty());
    }

    #[test]
    fn test_news_queries_normalised() {
        let config = SchedulerConfig {
            queries: vec![
                vec!["Coffee".to_string(), "cashew".to_string()],
                vec!["  ".to_string()],
            ],
            limit: 10,
            ..SchedulerConfig::default()
        };

        let queries = config.news_queries();

        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].fingerprint(), "news:cashew,coffee:10");
    }
}
