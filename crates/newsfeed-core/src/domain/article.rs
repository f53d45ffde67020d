use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Article listing as returned by the crawler, before its image is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleStub {
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    /// Where the lead image can be fetched from, if the listing had one.
    #[serde(default)]
    pub image_source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Article entity - a crawled news item ready to be served and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub summary: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl Article {
    /// Build an article from a crawler listing and the outcome of its image fetch.
    ///
    /// `image_url` is `None` when the listing had no image or the fetch failed;
    /// the article is still valid either way.
    pub fn from_stub(stub: ArticleStub, image_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: stub.title,
            source: stub.source,
            url: stub.url,
            published_at: stub.published_at,
            summary: stub.summary,
            image_url,
            tags: stub.tags,
            fetched_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_defaults_optional_fields() {
        let json = r#"{
            "title": "Cashew harvest up",
            "source": "Agri Daily",
            "url": "https://agri.example/cashew",
            "published_at": "2024-05-01T08:00:00Z"
        }"#;

        let stub: ArticleStub = serde_json::from_str(json).unwrap();

        assert_eq!(stub.summary, "");
        assert!(stub.image_source.is_none());
        assert!(stub.tags.is_empty());
    }

    #[test]
    fn test_from_stub_keeps_listing_fields() {
        let stub = ArticleStub {
            title: "Cashew prices".to_string(),
            source: "Market Wire".to_string(),
            url: "https://wire.example/1".to_string(),
            published_at: Utc::now(),
            summary: "Prices climbed".to_string(),
            image_source: Some("https://img.example/1".to_string()),
            tags: vec!["cashew".to_string(), "markets".to_string()],
        };

        let article = Article::from_stub(stub.clone(), None);

        assert_eq!(article.title, stub.title);
        assert_eq!(article.tags, stub.tags);
        assert!(article.image_url.is_none());
    }
}
