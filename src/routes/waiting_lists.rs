use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::lifecycle::AllocationLifecycle;
use crate::state::AppState;
use crate::waiting_list::WaitingList;

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub schedule_id: Uuid,
    pub prisoner_number: String,
}

pub async fn apply(
    State(state): State<AppState>,
    Json(payload): Json<ApplyRequest>,
) -> AppResult<(StatusCode, Json<WaitingList>)> {
    let prisoner_number = super::prisoner_number(&payload.prisoner_number)?;
    let application = AllocationLifecycle::new(&state)
        .apply_for(payload.schedule_id, &prisoner_number)
        .await?;
    Ok((StatusCode::CREATED, Json(application)))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(waiting_list_id): Path<Uuid>,
) -> AppResult<Json<WaitingList>> {
    Ok(Json(
        AllocationLifecycle::new(&state)
            .remove_application(waiting_list_id)
            .await?,
    ))
}
