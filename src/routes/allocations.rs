use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::allocation::{Allocation, DeallocationReason, Exclusion};
use crate::error::{AppError, AppResult};
use crate::lifecycle::{AllocationLifecycle, NewAllocation};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AllocateRequest {
    pub schedule_id: Uuid,
    pub prisoner_number: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub pay_band: Option<String>,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
}

#[derive(Debug, Deserialize)]
pub struct DeallocateRequest {
    pub reason: DeallocationReason,
    pub date: NaiveDate,
}

pub async fn allocate(
    State(state): State<AppState>,
    Json(payload): Json<AllocateRequest>,
) -> AppResult<(StatusCode, Json<Allocation>)> {
    let prisoner_number = super::prisoner_number(&payload.prisoner_number)?;
    let allocation = AllocationLifecycle::new(&state)
        .allocate(NewAllocation {
            schedule_id: payload.schedule_id,
            prisoner_number,
            start_date: payload.start_date,
            end_date: payload.end_date,
            pay_band: payload.pay_band,
            exclusions: payload.exclusions,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(allocation)))
}

pub async fn get_allocation(
    State(state): State<AppState>,
    Path(allocation_id): Path<Uuid>,
) -> AppResult<Json<Allocation>> {
    state
        .store
        .allocation(allocation_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("allocation {allocation_id} not found")))
}

pub async fn suspend(
    State(state): State<AppState>,
    Path(allocation_id): Path<Uuid>,
) -> AppResult<Json<Allocation>> {
    Ok(Json(AllocationLifecycle::new(&state).suspend(allocation_id).await?))
}

pub async fn unsuspend(
    State(state): State<AppState>,
    Path(allocation_id): Path<Uuid>,
) -> AppResult<Json<Allocation>> {
    Ok(Json(AllocationLifecycle::new(&state).unsuspend(allocation_id).await?))
}

pub async fn deallocate(
    State(state): State<AppState>,
    Path(allocation_id): Path<Uuid>,
    Json(payload): Json<DeallocateRequest>,
) -> AppResult<Json<Allocation>> {
    let allocation = AllocationLifecycle::new(&state)
        .deallocate(allocation_id, payload.reason, payload.date)
        .await?;
    Ok(Json(allocation))
}
