//! Bearer token authentication.

use std::future::{Ready, ready};
use std::sync::Arc;

use actix_web::http::header::{self, HeaderMap};
use actix_web::http::StatusCode;
use actix_web::{FromRequest, HttpRequest, HttpResponse, ResponseError, dev::Payload, web};

use newsfeed_core::ports::{AuthError, TokenClaims, TokenService};
use newsfeed_shared::ErrorResponse;

/// Authenticated caller.
///
/// Use this in handlers to require a valid bearer token:
/// ```ignore
/// async fn refresh(identity: Identity) -> impl Responder {
///     format!("Refresh requested by {}", identity.subject)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub roles: Vec<String>,
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject: claims.subject,
            roles: claims.roles,
        }
    }
}

/// Why a request could not be authenticated.
#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("Missing bearer token")]
    Missing,

    #[error(transparent)]
    Rejected(#[from] AuthError),

    #[error("Token service not configured")]
    Misconfigured,
}

impl ResponseError for AuthenticationError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthenticationError::Misconfigured => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AuthenticationError::Missing => ErrorResponse::new(401, "Authentication Required")
                .with_detail("Provide a Bearer token in the Authorization header."),
            AuthenticationError::Rejected(AuthError::TokenExpired) => {
                ErrorResponse::new(401, "Token Expired")
            }
            AuthenticationError::Rejected(AuthError::InvalidToken(msg)) => {
                ErrorResponse::new(401, "Invalid Token").with_detail(msg.clone())
            }
            AuthenticationError::Misconfigured => ErrorResponse::internal_error(),
        };

        HttpResponse::build(self.status_code()).json(error)
    }
}

/// The raw token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validate the request's bearer token, if any.
pub fn authenticate(
    headers: &HeaderMap,
    tokens: &dyn TokenService,
) -> Result<Identity, AuthenticationError> {
    let token = bearer_token(headers).ok_or(AuthenticationError::Missing)?;
    Ok(tokens.validate_token(token)?.into())
}

impl FromRequest for Identity {
    type Error = AuthenticationError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let Some(tokens) = req.app_data::<web::Data<Arc<dyn TokenService>>>() else {
            tracing::error!("TokenService not found in app data");
            return ready(Err(AuthenticationError::Misconfigured));
        };

        ready(authenticate(req.headers(), tokens.get_ref().as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use newsfeed_infra::auth::{JwtConfig, JwtTokenService};

    fn tokens() -> JwtTokenService {
        JwtTokenService::new(JwtConfig {
            secret: "middleware-test".to_string(),
            ..JwtConfig::default()
        })
    }

    #[test]
    fn test_bearer_token_parsing() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc.def"))
            .to_http_request();
        assert_eq!(bearer_token(req.headers()), Some("abc.def"));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic dXNlcg=="))
            .to_http_request();
        assert_eq!(bearer_token(req.headers()), None);

        let req = TestRequest::default().to_http_request();
        assert_eq!(bearer_token(req.headers()), None);
    }

    #[test]
    fn test_authenticate_valid_token() {
        let tokens = tokens();
        let token = tokens.generate_token("reader-7", vec![]).unwrap();
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, format!("Bearer {token}")))
            .to_http_request();

        let identity = authenticate(req.headers(), &tokens).unwrap();
        assert_eq!(identity.subject, "reader-7");
    }

    #[test]
    fn test_authenticate_missing_and_invalid() {
        let tokens = tokens();

        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            authenticate(req.headers(), &tokens),
            Err(AuthenticationError::Missing)
        ));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer garbage"))
            .to_http_request();
        let err = authenticate(req.headers(), &tokens).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
