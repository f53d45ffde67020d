//! Health check endpoint.

use actix_web::{HttpResponse, web};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    /// Stored article count; absent when the store cannot be reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub articles: Option<u64>,
}

/// GET /api/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let articles = match state.articles.count().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Article store unavailable during health check");
            None
        }
    };

    HttpResponse::Ok().json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        articles,
    })
}
