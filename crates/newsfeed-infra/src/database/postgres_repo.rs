//! PostgreSQL article repository.

use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DbConn, DbErr, EntityTrait, PaginatorTrait, TransactionTrait};

use newsfeed_core::domain::Article;
use newsfeed_core::error::RepoError;
use newsfeed_core::ports::ArticleRepository;

use super::entity::article::{self, Entity as ArticleEntity};

/// PostgreSQL article repository.
///
/// A batch is written with one multi-row insert inside a transaction.
/// Re-crawled articles are matched on `url` and updated in place.
pub struct PostgresArticleRepository {
    db: DbConn,
}

impl PostgresArticleRepository {
    pub fn new(db: DbConn) -> Self {
        Self { db }
    }
}

fn query_error(e: DbErr) -> RepoError {
    let err_str = e.to_string();
    if err_str.contains("duplicate") || err_str.contains("unique") {
        RepoError::Constraint(err_str)
    } else {
        RepoError::Query(err_str)
    }
}

#[async_trait]
impl ArticleRepository for PostgresArticleRepository {
    async fn save_batch(&self, articles: &[Article]) -> Result<usize, RepoError> {
        if articles.is_empty() {
            return Ok(0);
        }

        let models: Vec<article::ActiveModel> =
            articles.iter().cloned().map(Into::into).collect();

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| RepoError::Connection(e.to_string()))?;

        ArticleEntity::insert_many(models)
            .on_conflict(
                OnConflict::column(article::Column::Url)
                    .update_columns([
                        article::Column::Title,
                        article::Column::Source,
                        article::Column::PublishedAt,
                        article::Column::Summary,
                        article::Column::ImageUrl,
                        article::Column::Tags,
                        article::Column::FetchedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await
            .map_err(query_error)?;

        txn.commit()
            .await
            .map_err(|e| RepoError::Connection(e.to_string()))?;

        tracing::debug!(count = articles.len(), "Article batch saved");
        Ok(articles.len())
    }

    async fn count(&self) -> Result<u64, RepoError> {
        ArticleEntity::find()
            .count(&self.db)
            .await
            .map_err(query_error)
    }
}
