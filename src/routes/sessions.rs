use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::attendance::{Attendance, AttendanceReason};
use crate::error::AppResult;
use crate::schedule::ScheduledInstance;
use crate::sessions::SessionManager;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordAttendanceRequest {
    pub reason: AttendanceReason,
    #[serde(default)]
    pub issue_payment: bool,
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(instance_id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> AppResult<Json<ScheduledInstance>> {
    let instance = SessionManager::new(&state)
        .cancel_instance(instance_id, &payload.reason)
        .await?;
    Ok(Json(instance))
}

pub async fn uncancel(
    State(state): State<AppState>,
    Path(instance_id): Path<Uuid>,
) -> AppResult<Json<ScheduledInstance>> {
    Ok(Json(
        SessionManager::new(&state)
            .uncancel_instance(instance_id)
            .await?,
    ))
}

pub async fn attendances(
    State(state): State<AppState>,
    Path(instance_id): Path<Uuid>,
) -> AppResult<Json<Vec<Attendance>>> {
    Ok(Json(SessionManager::new(&state).attendances(instance_id).await?))
}

pub async fn record_attendance(
    State(state): State<AppState>,
    Path((instance_id, prisoner_number)): Path<(Uuid, String)>,
    Json(payload): Json<RecordAttendanceRequest>,
) -> AppResult<Json<Attendance>> {
    let prisoner_number = super::prisoner_number(&prisoner_number)?;
    let attendance = SessionManager::new(&state)
        .record_attendance(
            instance_id,
            &prisoner_number,
            payload.reason,
            payload.issue_payment,
        )
        .await?;
    Ok(Json(attendance))
}
