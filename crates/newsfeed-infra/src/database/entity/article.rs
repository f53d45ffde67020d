//! Article entity for SeaORM.

use sea_orm::Set;
use sea_orm::entity::prelude::*;

use newsfeed_core::domain::Article;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "articles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    pub source: String,
    #[sea_orm(unique)]
    pub url: String,
    pub published_at: DateTimeWithTimeZone,
    #[sea_orm(column_type = "Text")]
    pub summary: String,
    pub image_url: Option<String>,
    pub tags: Json,
    pub fetched_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Article {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            source: model.source,
            url: model.url,
            published_at: model.published_at.into(),
            summary: model.summary,
            image_url: model.image_url,
            // A malformed tag column degrades to no tags.
            tags: serde_json::from_value(model.tags).unwrap_or_default(),
            fetched_at: model.fetched_at.into(),
        }
    }
}

impl From<Article> for ActiveModel {
    fn from(article: Article) -> Self {
        Self {
            id: Set(article.id),
            title: Set(article.title),
            source: Set(article.source),
            url: Set(article.url),
            published_at: Set(article.published_at.into()),
            summary: Set(article.summary),
            image_url: Set(article.image_url),
            tags: Set(Json::from(article.tags)),
            fetched_at: Set(article.fetched_at.into()),
        }
    }
}
