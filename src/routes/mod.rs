use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub mod allocations;
pub mod events;
pub mod health;
pub mod jobs;
pub mod sessions;
pub mod waiting_lists;

/// Prisoner numbers are stored upper case with no surrounding whitespace.
pub(crate) fn prisoner_number(raw: &str) -> AppResult<String> {
    let normalized = raw.trim().to_uppercase();
    if normalized.is_empty() {
        return Err(AppError::bad_request("prisoner_number must not be empty"));
    }
    Ok(normalized)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request());

    let allocation_routes = Router::new()
        .route("/", post(allocations::allocate))
        .route("/:id", get(allocations::get_allocation))
        .route("/:id/suspend", put(allocations::suspend))
        .route("/:id/unsuspend", put(allocations::unsuspend))
        .route("/:id/deallocate", post(allocations::deallocate));

    let session_routes = Router::new()
        .route("/:id/cancel", put(sessions::cancel))
        .route("/:id/uncancel", put(sessions::uncancel))
        .route("/:id/attendances", get(sessions::attendances))
        .route(
            "/:id/attendances/:prisoner_number",
            put(sessions::record_attendance),
        );

    let waiting_list_routes = Router::new()
        .route("/", post(waiting_lists::apply))
        .route("/:id/remove", put(waiting_lists::remove));

    Router::new()
        .route("/job/:job_type", post(jobs::trigger_job))
        .route("/job-runs/:id", get(jobs::get_job_run))
        .route("/events/prisoner-movement", post(events::prisoner_movement))
        .nest("/allocations", allocation_routes)
        .nest("/scheduled-instances", session_routes)
        .nest("/waiting-lists", waiting_list_routes)
        .route("/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
