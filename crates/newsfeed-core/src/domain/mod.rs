//! Domain entities - the core business objects.

mod article;
mod client;
mod query;

pub use article::{Article, ArticleStub};
pub use client::{ANONYMOUS_CLIENT, client_key};
pub use query::{DEFAULT_LIMIT, MAX_LIMIT, NewsQuery};
