//! Data Transfer Objects - request/response types for the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query string of `GET /api/news`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsParams {
    /// Comma separated keywords, e.g. `cashew,almonds`.
    pub keywords: String,
    pub limit: Option<usize>,
}

/// Body of `POST /api/news/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Article as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDto {
    pub id: Uuid,
    pub title: String,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

/// Result of a news query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsResponse {
    /// Normalised keywords the results were fetched for.
    pub keywords: Vec<String>,
    pub limit: usize,
    pub count: usize,
    pub articles: Vec<ArticleDto>,
}
