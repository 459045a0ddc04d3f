use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::dto::{HealthDetailsResponse, HealthResponse};
use crate::middleware::{API_KEY_HEADER, secret_matches};
use crate::state::AppState;

/// Liveness for anyone; secret-store status and store counts for API key holders.
pub async fn health_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !secret_matches(headers.get(API_KEY_HEADER), &state.api_key) {
        return Json(HealthResponse { status: "ok" }).into_response();
    }

    let report = state.approval_service.health().await;
    let (status, vault) = if report.is_healthy() {
        ("ok", "ok".to_owned())
    } else {
        let error = report.secret_store_error.as_deref().unwrap_or_default();
        ("degraded", format!("error: {error}"))
    };

    Json(HealthDetailsResponse {
        status,
        vault,
        uptime_seconds: state.started_at.elapsed().as_secs(),
        requests_in_store: report.requests_in_store,
        pending_requests: report.pending_requests,
    })
    .into_response()
}
