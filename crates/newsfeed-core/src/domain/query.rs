use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Limit used when the caller does not give one.
pub const DEFAULT_LIMIT: usize = 20;

/// Upper bound on articles per query.
pub const MAX_LIMIT: usize = 50;

/// A normalised news search: keywords plus result limit.
///
/// Keywords are trimmed, lower-cased, sorted and de-duplicated so that
/// equivalent searches share one cache fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewsQuery {
    keywords: Vec<String>,
    limit: usize,
}

impl NewsQuery {
    pub fn new<I, S>(keywords: I, limit: usize) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        keywords.sort();
        keywords.dedup();

        if keywords.is_empty() {
            return Err(DomainError::Validation(
                "at least one keyword is required".to_string(),
            ));
        }

        Ok(Self {
            keywords,
            limit: limit.clamp(1, MAX_LIMIT),
        })
    }

    /// Parse a comma separated keyword list, e.g. `"cashew, almonds"`.
    pub fn parse(raw: &str, limit: Option<usize>) -> Result<Self, DomainError> {
        Self::new(raw.split(','), limit.unwrap_or(DEFAULT_LIMIT))
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Cache key identifying this search.
    pub fn fingerprint(&self) -> String {
        format!("news:{}:{}", self.keywords.join(","), self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_queries_share_fingerprint() {
        let a = NewsQuery::new(["Cashew", " almonds "], 5).unwrap();
        let b = NewsQuery::parse("almonds,cashew,CASHEW", Some(5)).unwrap();

        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), "news:almonds,cashew:5");
    }

    #[test]
    fn test_limit_is_part_of_fingerprint() {
        let a = NewsQuery::new(["cashew"], 5).unwrap();
        let b = NewsQuery::new(["cashew"], 10).unwrap();

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(NewsQuery::new(["cashew"], 0).unwrap().limit(), 1);
        assert_eq!(NewsQuery::new(["cashew"], 500).unwrap().limit(), MAX_LIMIT);
        assert_eq!(NewsQuery::parse("cashew", None).unwrap().limit(), DEFAULT_LIMIT);
    }

    #[test]
    fn test_blank_keywords_rejected() {
        let result = NewsQuery::parse(" , ,", Some(5));
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }
}
