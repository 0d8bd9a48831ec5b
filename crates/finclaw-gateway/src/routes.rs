//! API route handlers for the gateway.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use finclaw_scheduler::service::{
    CancelTaskRequest, CleanupRequest, GetIntentsRequest, RetryTaskRequest, SettingsUpdate,
};

use super::server::AppState;

/// Serialize a service response into the JSON body.
fn to_json<T: Serialize>(value: T) -> Json<serde_json::Value> {
    match serde_json::to_value(value) {
        Ok(json) => Json(json),
        Err(e) => {
            tracing::error!("💥 Response serialization failed: {e}");
            Json(serde_json::json!({"success": false, "error": format!("serialization failed: {e}")}))
        }
    }
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "finclaw-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Engine state, pool usage and uptime.
pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let status = state.scheduler.status();
    Json(serde_json::json!({
        "success": true,
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "gateway": {
            "host": state.gateway_config.host,
            "port": state.gateway_config.port,
        },
        "scheduler": status,
    }))
}

/// Paginated intent listing.
/// `GET /api/v1/scheduler/intents?limit=50&offset=0&scheduler_type=finance-sync&status=failed`
pub async fn list_intents(
    State(state): State<Arc<AppState>>,
    Query(req): Query<GetIntentsRequest>,
) -> Json<serde_json::Value> {
    to_json(state.scheduler.get_intents(req))
}

pub async fn intent_summary(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    to_json(state.scheduler.get_summary())
}

pub async fn diagnostics(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    to_json(state.scheduler.get_diagnostics())
}

#[derive(Debug, Default, Deserialize)]
pub struct SchedulesQuery {
    #[serde(default)]
    pub scheduler_type: Option<String>,
}

pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SchedulesQuery>,
) -> Json<serde_json::Value> {
    let kind = query.scheduler_type.as_deref().filter(|s| !s.is_empty());
    to_json(state.scheduler.list_schedules(kind))
}

pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CancelTaskRequest>,
) -> Json<serde_json::Value> {
    to_json(state.scheduler.cancel_task(req))
}

pub async fn retry_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RetryTaskRequest>,
) -> Json<serde_json::Value> {
    to_json(state.scheduler.retry_task(req))
}

/// Body is optional; `{}` uses the configured retention horizon.
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    body: Option<Json<CleanupRequest>>,
) -> Json<serde_json::Value> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    to_json(state.scheduler.cleanup_older_than(req))
}

pub async fn start_scheduler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    to_json(state.scheduler.start_scheduler())
}

pub async fn stop_scheduler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    to_json(state.scheduler.stop_scheduler())
}

/// Manual trigger of one coordinator pass.
pub async fn sync_now(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    to_json(state.scheduler.sync_now())
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    to_json(state.scheduler.get_settings())
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Json<serde_json::Value> {
    to_json(state.scheduler.set_settings(update))
}
