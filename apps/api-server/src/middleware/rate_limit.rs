//! Rate limiting middleware.
//!
//! Every request is counted against its client's fixed window before it
//! reaches a handler. Throttled requests get a 429 with a `retryAfter` body
//! and `Retry-After` header; allowed ones carry `X-RateLimit-*` headers.

use std::future::{Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue, RETRY_AFTER},
};
use futures::future::LocalBoxFuture;

use newsfeed_core::domain::client_key;
use newsfeed_core::ports::{RateLimitDecision, RateLimiter, TokenService};
use newsfeed_shared::RateLimitedResponse;

use super::auth::bearer_token;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    limiter: Arc<dyn RateLimiter>,
    tokens: Option<Arc<dyn TokenService>>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            limiter,
            tokens: None,
        }
    }

    /// Key authenticated callers by token subject instead of address.
    pub fn with_tokens(mut self, tokens: Arc<dyn TokenService>) -> Self {
        self.tokens = Some(tokens);
        self
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    tokens: Option<Arc<dyn TokenService>>,
}

impl<S> RateLimitMiddlewareService<S> {
    /// `user:<subject>` for a valid bearer token, else `ip:<addr>`, else the
    /// shared anonymous bucket. Invalid tokens are ignored here; handlers that
    /// need authentication reject them themselves.
    fn client_key(&self, req: &ServiceRequest) -> String {
        let subject = self.tokens.as_ref().and_then(|tokens| {
            let token = bearer_token(req.headers())?;
            tokens.validate_token(token).ok().map(|claims| claims.subject)
        });

        let info = req.connection_info();
        client_key(subject.as_deref(), info.realip_remote_addr())
    }
}

fn limit_headers(decision: &RateLimitDecision) -> [(HeaderName, HeaderValue); 2] {
    [
        (LIMIT_HEADER, HeaderValue::from(decision.limit)),
        (REMAINING_HEADER, HeaderValue::from(decision.remaining)),
    ]
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let limiter = self.limiter.clone();
        let key = self.client_key(&req);

        Box::pin(async move {
            let decision = match limiter.check(&key).await {
                Ok(decision) => Some(decision),
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "Rate limiter error, failing open");
                    None
                }
            };

            if let Some(decision) = decision.filter(|d| !d.allowed) {
                tracing::warn!(
                    key = %key,
                    retry_after = decision.retry_after_secs,
                    "Rate limit exceeded"
                );

                let mut response = HttpResponse::TooManyRequests();
                response.insert_header((RETRY_AFTER, decision.retry_after_secs));
                for header in limit_headers(&decision) {
                    response.insert_header(header);
                }
                let response = response.json(RateLimitedResponse::new(
                    limiter.message(),
                    decision.retry_after_secs,
                ));

                let (http_req, _payload) = req.into_parts();
                return Ok(ServiceResponse::new(http_req, response).map_into_right_body());
            }

            let mut res = service.call(req).await?;
            if let Some(decision) = decision {
                for (name, value) in limit_headers(&decision) {
                    res.headers_mut().insert(name, value);
                }
            }
            Ok(res.map_into_left_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use actix_web::{App, HttpResponse, http::StatusCode, test, web};
    use async_trait::async_trait;
    use newsfeed_core::ports::RateLimitError;
    use newsfeed_infra::auth::{JwtConfig, JwtTokenService};
    use newsfeed_infra::rate_limit::{InMemoryRateLimiter, RateLimitConfig};

    fn limiter(max_requests: u32) -> Arc<dyn RateLimiter> {
        Arc::new(InMemoryRateLimiter::new(RateLimitConfig {
            max_requests,
            window: Duration::from_secs(60),
            message: "Slow down".to_string(),
            ..RateLimitConfig::default()
        }))
    }

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    #[actix_web::test]
    async fn test_allows_then_throttles() {
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter(2)))
                .route("/api/news", web::get().to(ok)),
        )
        .await;

        let peer = "10.1.2.3:4000".parse().unwrap();

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/news").peer_addr(peer).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "2");
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "1");

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/news").peer_addr(peer).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/news").peer_addr(peer).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry: u64 = res
            .headers()
            .get(RETRY_AFTER)
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry >= 1 && retry <= 60);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Slow down");
        assert_eq!(body["retryAfter"], retry);
    }

    #[actix_web::test]
    async fn test_clients_counted_separately() {
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter(1)))
                .route("/", web::get().to(ok)),
        )
        .await;

        for addr in ["10.0.0.1:1", "10.0.0.2:1"] {
            let req = test::TestRequest::get()
                .peer_addr(addr.parse().unwrap())
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }
    }

    #[actix_web::test]
    async fn test_authenticated_caller_keyed_by_subject() {
        let tokens: Arc<dyn TokenService> = Arc::new(JwtTokenService::new(JwtConfig::default()));
        let token = tokens.generate_token("reader-1", vec![]).unwrap();
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(limiter(1)).with_tokens(tokens))
                .route("/", web::get().to(ok)),
        )
        .await;

        // Same address, different identities: separate budgets.
        let peer = "10.9.9.9:1".parse().unwrap();
        let req = test::TestRequest::get()
            .peer_addr(peer)
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get().peer_addr(peer).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .peer_addr(peer)
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    struct BrokenLimiter;

    #[async_trait]
    impl RateLimiter for BrokenLimiter {
        async fn check(&self, _key: &str) -> Result<RateLimitDecision, RateLimitError> {
            Err(RateLimitError::Backend("connection refused".to_string()))
        }

        fn message(&self) -> &str {
            "unused"
        }
    }

    #[actix_web::test]
    async fn test_backend_error_fails_open() {
        let app = test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(Arc::new(BrokenLimiter)))
                .route("/", web::get().to(ok)),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get("x-ratelimit-limit").is_none());
    }
}
