//! Error handling - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use newsfeed_core::DomainError;
use newsfeed_core::ports::CrawlError;
use newsfeed_shared::ErrorResponse;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::Upstream(detail) => {
                tracing::warn!(detail = %detail, "Upstream failure");
                ErrorResponse::bad_gateway("The news crawler could not be reached.")
            }
            AppError::Internal(detail) => {
                tracing::error!(detail = %detail, "Internal error");
                ErrorResponse::internal_error()
            }
        };

        HttpResponse::build(self.status_code()).json(error)
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::BadRequest(msg),
        }
    }
}

impl From<CrawlError> for AppError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Request(msg) | CrawlError::InvalidResponse(msg) => AppError::Upstream(msg),
            CrawlError::Persistence(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
