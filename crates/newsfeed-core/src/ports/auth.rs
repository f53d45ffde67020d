//! Authentication ports.

/// Claims carried by a bearer token.
#[derive(Debug, Clone)]
pub struct TokenClaims {
    /// Stable identity of the caller; used as the rate-limit key.
    pub subject: String,
    pub roles: Vec<String>,
    pub exp: i64,
}

/// Token service trait for bearer token operations.
pub trait TokenService: Send + Sync {
    /// Issue a token for a subject.
    fn generate_token(&self, subject: &str, roles: Vec<String>) -> Result<String, AuthError>;

    /// Validate and decode a token.
    fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError>;
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}
