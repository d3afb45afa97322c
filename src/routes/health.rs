use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::json;
use tracing::warn;

use crate::state::AppState;

/// Reports whether the store answers; the scheduler and event routes are
/// useless without it.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.rollout_prisons().await {
        Ok(prisons) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "enabled_prisons": prisons.iter().filter(|prison| prison.activities_enabled).count(),
            })),
        ),
        Err(err) => {
            warn!(error = %err, "health check could not reach the store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "error": err.to_string() })),
            )
        }
    }
}
