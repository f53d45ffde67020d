//! # Newsfeed API Server
//!
//! Actix-web entry point: rate limiting in front of cache-tiered news queries.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

#[cfg(feature = "scheduler")]
mod background;
mod config;
mod handlers;
mod middleware;
mod state;
mod telemetry;

use config::AppConfig;
use middleware::rate_limit::RateLimitMiddleware;
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = AppConfig::from_env();

    tracing::info!(
        host = %config.host,
        port = config.port,
        "Starting newsfeed API server"
    );

    let state = AppState::new(&config).await?;

    #[cfg(feature = "scheduler")]
    let scheduler = {
        let scheduler_config = background::SchedulerConfig::from_env();
        match background::RefreshScheduler::start(&scheduler_config, state.orchestrator.clone())
            .await
        {
            Ok(scheduler) => scheduler,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start refresh scheduler");
                None
            }
        }
    };

    let result = HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(
                RateLimitMiddleware::new(state.rate_limiter.clone())
                    .with_tokens(state.token_service.clone()),
            )
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.token_service.clone()))
            .app_data(web::Data::new(state))
            .configure(handlers::configure_routes)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await;

    #[cfg(feature = "scheduler")]
    {
        if let Some(scheduler) = scheduler {
            if let Err(e) = scheduler.shutdown().await {
                tracing::error!(error = %e, "Scheduler did not shut down cleanly");
            }
        }
    }

    tracing::info!("Server stopped");
    result
}
