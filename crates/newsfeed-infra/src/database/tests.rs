use std::collections::BTreeMap;

use chrono::Utc;
use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Value};

use newsfeed_core::domain::{Article, ArticleStub};
use newsfeed_core::ports::ArticleRepository;

use crate::database::entity::article;
use crate::database::postgres_repo::PostgresArticleRepository;

fn sample(i: usize) -> Article {
    Article::from_stub(
        ArticleStub {
            title: format!("Story {i}"),
            source: "Wire".to_owned(),
            url: format!("https://news.example/{i}"),
            published_at: Utc::now(),
            summary: "Summary".to_owned(),
            image_source: None,
            tags: vec!["cashew".to_owned()],
        },
        None,
    )
}

#[tokio::test]
async fn test_save_batch_single_transaction() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_exec_results([MockExecResult {
            last_insert_id: 0,
            rows_affected: 3,
        }])
        .into_connection();

    let repo = PostgresArticleRepository::new(db);
    let batch: Vec<Article> = (0..3).map(sample).collect();

    let saved = repo.save_batch(&batch).await.unwrap();
    assert_eq!(saved, 3);
}

#[tokio::test]
async fn test_save_empty_batch_skips_database() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let repo = PostgresArticleRepository::new(db);

    assert_eq!(repo.save_batch(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_count() {
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([[BTreeMap::from([("num_items", Value::BigInt(Some(7)))])]])
        .into_connection();

    let repo = PostgresArticleRepository::new(db);
    assert_eq!(repo.count().await.unwrap(), 7);
}

#[test]
fn test_model_round_trips_tags() {
    let article = sample(1);
    let model = article::Model {
        id: article.id,
        title: article.title.clone(),
        source: article.source.clone(),
        url: article.url.clone(),
        published_at: article.published_at.into(),
        summary: article.summary.clone(),
        image_url: None,
        tags: serde_json::json!(["cashew", "markets"]),
        fetched_at: article.fetched_at.into(),
    };

    let restored: Article = model.into();
    assert_eq!(restored.tags, vec!["cashew", "markets"]);
    assert_eq!(restored.url, article.url);
}
