//! News endpoints.

use actix_web::{HttpResponse, web};

use newsfeed_core::domain::{Article, DEFAULT_LIMIT, NewsQuery};
use newsfeed_shared::ApiResponse;
use newsfeed_shared::dto::{ArticleDto, NewsParams, NewsResponse, RefreshRequest};

use crate::middleware::auth::Identity;
use crate::middleware::error::AppResult;
use crate::state::AppState;

fn to_dto(article: Article) -> ArticleDto {
    ArticleDto {
        id: article.id,
        title: article.title,
        source: article.source,
        url: article.url,
        published_at: article.published_at,
        summary: article.summary,
        image_url: article.image_url,
        tags: article.tags,
        fetched_at: article.fetched_at,
    }
}

fn respond(query: &NewsQuery, articles: Vec<Article>) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(NewsResponse {
        keywords: query.keywords().to_vec(),
        limit: query.limit(),
        count: articles.len(),
        articles: articles.into_iter().map(to_dto).collect(),
    }))
}

/// GET /api/news?keywords=a,b&limit=n
///
/// Served from the cache tiers; crawls only when neither tier has the query.
pub async fn get_news(
    state: web::Data<AppState>,
    params: web::Query<NewsParams>,
) -> AppResult<HttpResponse> {
    let query = NewsQuery::parse(&params.keywords, params.limit)?;
    let articles = state.orchestrator.articles(&query).await?;
    Ok(respond(&query, articles))
}

/// POST /api/news/refresh
///
/// Forces a crawl and replaces the cached results. Requires a bearer token.
pub async fn refresh_news(
    state: web::Data<AppState>,
    identity: Identity,
    body: web::Json<RefreshRequest>,
) -> AppResult<HttpResponse> {
    let RefreshRequest { keywords, limit } = body.into_inner();
    let query = NewsQuery::new(keywords, limit.unwrap_or(DEFAULT_LIMIT))?;

    tracing::info!(
        subject = %identity.subject,
        roles = ?identity.roles,
        query = %query.fingerprint(),
        "Manual refresh requested"
    );

    let articles = state.orchestrator.refresh(&query).await?;
    Ok(respond(&query, articles))
}
