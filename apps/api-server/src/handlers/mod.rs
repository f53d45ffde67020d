//! HTTP handlers and route configuration.

mod health;
mod news;

use actix_web::web;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health::health_check))
            .service(
                web::scope("/news")
                    .route("", web::get().to(news::get_news))
                    .route("/refresh", web::post().to(news::refresh_news)),
            ),
    );
}
