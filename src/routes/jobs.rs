use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::jobs::{JobFlags, JobOrchestrator, JobRun, JobType};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TriggerJobQuery {
    pub activate: Option<bool>,
    pub deallocate: Option<bool>,
    /// Comma separated prison codes; every enabled prison when absent.
    pub prisons: Option<String>,
}

impl TriggerJobQuery {
    fn flags(&self) -> JobFlags {
        let defaults = JobFlags::default();
        JobFlags {
            activate: self.activate.unwrap_or(defaults.activate),
            deallocate: self.deallocate.unwrap_or(defaults.deallocate),
        }
    }

    fn prisons(&self) -> Option<Vec<String>> {
        self.prisons.as_ref().map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_uppercase)
                .collect()
        })
    }
}

pub async fn trigger_job(
    State(state): State<AppState>,
    Path(job_type): Path<String>,
    Query(query): Query<TriggerJobQuery>,
) -> AppResult<(StatusCode, Json<JobRun>)> {
    let job_type: JobType = job_type.parse().map_err(AppError::bad_request)?;
    let run = JobOrchestrator::new(state)
        .start(job_type, query.flags(), query.prisons())
        .await?;
    Ok((StatusCode::CREATED, Json(run)))
}

pub async fn get_job_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> AppResult<Json<JobRun>> {
    let run = state
        .store
        .job_run(run_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("job run {run_id} not found")))?;
    Ok(Json(run))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prison_list_is_trimmed_and_uppercased() {
        let query = TriggerJobQuery {
            prisons: Some(" rsi, MDI,,".into()),
            ..Default::default()
        };
        assert_eq!(query.prisons(), Some(vec!["RSI".to_string(), "MDI".to_string()]));
    }

    #[test]
    fn unset_flags_default_to_enabled() {
        let query = TriggerJobQuery {
            deallocate: Some(false),
            ..Default::default()
        };
        assert_eq!(
            query.flags(),
            JobFlags {
                activate: true,
                deallocate: false
            }
        );
    }
}
