//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, post},
};
use finclaw_core::config::GatewayConfig;
use finclaw_scheduler::SchedulerService;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub gateway_config: GatewayConfig,
    pub start_time: std::time::Instant,
    /// Procedure-call surface of the scheduler engine.
    pub scheduler: SchedulerService,
}

impl AppState {
    pub fn new(gateway_config: GatewayConfig, scheduler: SchedulerService) -> Self {
        Self {
            gateway_config,
            start_time: std::time::Instant::now(),
            scheduler,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);

    let scheduler = Router::new()
        .route("/status", get(super::routes::scheduler_status))
        .route("/intents", get(super::routes::list_intents))
        .route("/summary", get(super::routes::intent_summary))
        .route("/diagnostics", get(super::routes::diagnostics))
        .route("/schedules", get(super::routes::list_schedules))
        .route("/cancel", post(super::routes::cancel_task))
        .route("/retry", post(super::routes::retry_task))
        .route("/cleanup", post(super::routes::cleanup))
        .route("/start", post(super::routes::start_scheduler))
        .route("/stop", post(super::routes::stop_scheduler))
        .route("/sync", post(super::routes::sync_now))
        .route(
            "/settings",
            get(super::routes::get_settings).put(super::routes::update_settings),
        );

    Router::new()
        .route("/health", get(super::routes::health_check))
        .nest("/api/v1/scheduler", scheduler)
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));

            // Example: FINCLAW_CORS_ORIGINS=http://localhost:5173,app://finclaw
            if let Ok(origins_str) = std::env::var("FINCLAW_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                // Localhost-only server; the desktop shell loads from varying origins.
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server. Runs until the listener fails or the task is dropped.
pub async fn start(config: &GatewayConfig, scheduler: SchedulerService) -> anyhow::Result<()> {
    let app = build_router(AppState::new(config.clone(), scheduler));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
