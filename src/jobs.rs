use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    str::FromStr,
    sync::Arc,
};

use chrono::NaiveDateTime;
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    state::AppState,
    store::StoreError,
    workers::{default_handlers, JobExecution, JobHandler},
};

pub const JOB_CREATE_SCHEDULED_INSTANCES: &str = "create-scheduled-instances";
pub const JOB_CREATE_ATTENDANCE_RECORDS: &str = "create-attendance-records";
pub const JOB_MANAGE_ALLOCATIONS: &str = "manage-allocations";
pub const JOB_DAILY: &str = "daily";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    CreateScheduledInstances,
    CreateAttendanceRecords,
    ManageAllocations,
    Daily,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::CreateScheduledInstances => JOB_CREATE_SCHEDULED_INSTANCES,
            JobType::CreateAttendanceRecords => JOB_CREATE_ATTENDANCE_RECORDS,
            JobType::ManageAllocations => JOB_MANAGE_ALLOCATIONS,
            JobType::Daily => JOB_DAILY,
        }
    }

    /// The per-prison steps this job runs, in order.
    pub fn stages(&self) -> &'static [JobType] {
        match self {
            JobType::CreateScheduledInstances => &[JobType::CreateScheduledInstances],
            JobType::CreateAttendanceRecords => &[JobType::CreateAttendanceRecords],
            JobType::ManageAllocations => &[JobType::ManageAllocations],
            JobType::Daily => &[
                JobType::CreateScheduledInstances,
                JobType::CreateAttendanceRecords,
                JobType::ManageAllocations,
            ],
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            JOB_CREATE_SCHEDULED_INSTANCES => Ok(JobType::CreateScheduledInstances),
            JOB_CREATE_ATTENDANCE_RECORDS => Ok(JobType::CreateAttendanceRecords),
            JOB_MANAGE_ALLOCATIONS => Ok(JobType::ManageAllocations),
            JOB_DAILY => Ok(JobType::Daily),
            other => Err(format!("unknown job type {other}")),
        }
    }
}

fn enabled() -> bool {
    true
}

/// Which halves of the allocation date pass run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFlags {
    #[serde(default = "enabled")]
    pub activate: bool,
    #[serde(default = "enabled")]
    pub deallocate: bool,
}

impl Default for JobFlags {
    fn default() -> Self {
        Self {
            activate: true,
            deallocate: true,
        }
    }
}

/// Progress of one job invocation across its prisons. `successful` stays
/// unset until every subtask has reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRun {
    pub id: Uuid,
    pub job_type: JobType,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub total_subtasks: i32,
    pub completed_subtasks: i32,
    pub failed_subtasks: i32,
    pub successful: Option<bool>,
    pub last_error: Option<String>,
}

impl JobRun {
    pub fn new(job_type: JobType, total_subtasks: i32, started_at: NaiveDateTime) -> Self {
        let mut run = Self {
            id: Uuid::new_v4(),
            job_type,
            started_at,
            finished_at: None,
            total_subtasks,
            completed_subtasks: 0,
            failed_subtasks: 0,
            successful: None,
            last_error: None,
        };
        run.settle(started_at);
        run
    }

    pub fn is_finished(&self) -> bool {
        self.successful.is_some()
    }

    pub fn reported_subtasks(&self) -> i32 {
        self.completed_subtasks + self.failed_subtasks
    }

    /// Counts one subtask outcome. Callers make sure each prison reports once.
    pub(crate) fn apply_outcome(&mut self, outcome: &SubtaskOutcome, at: NaiveDateTime) {
        match outcome {
            SubtaskOutcome::Succeeded => self.completed_subtasks += 1,
            SubtaskOutcome::Failed(message) => {
                self.failed_subtasks += 1;
                self.last_error = Some(message.clone());
            }
        }
        self.settle(at);
    }

    pub(crate) fn settle(&mut self, at: NaiveDateTime) {
        if self.successful.is_none() && self.reported_subtasks() >= self.total_subtasks {
            self.successful = Some(self.failed_subtasks == 0);
            self.finished_at = Some(at);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloutPrison {
    pub prison_code: String,
    pub activities_enabled: bool,
    #[serde(default)]
    pub appointments_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtaskOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("job run {0} disappeared")]
    RunMissing(Uuid),
}

/// Fans a job out over the enabled prisons and records each prison's outcome
/// against the [`JobRun`].
#[derive(Clone)]
pub struct JobOrchestrator {
    state: AppState,
    handlers: Arc<HashMap<JobType, Arc<dyn JobHandler>>>,
}

impl JobOrchestrator {
    pub fn new(state: AppState) -> Self {
        Self::with_handlers(state, default_handlers())
    }

    pub fn with_handlers(state: AppState, handlers: Vec<Arc<dyn JobHandler>>) -> Self {
        let map = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers: Arc::new(map),
        }
    }

    /// Creates the run and returns it straight away; the prisons are
    /// processed on a spawned task.
    pub async fn start(
        &self,
        job_type: JobType,
        flags: JobFlags,
        prisons: Option<Vec<String>>,
    ) -> Result<JobRun, JobError> {
        let (run, targets) = self.prepare(job_type, prisons).await?;
        let orchestrator = self.clone();
        let run_id = run.id;
        tokio::spawn(async move {
            orchestrator.execute(run_id, job_type, flags, targets).await;
        });
        Ok(run)
    }

    /// Runs the job to completion and returns the final run record.
    pub async fn run(
        &self,
        job_type: JobType,
        flags: JobFlags,
        prisons: Option<Vec<String>>,
    ) -> Result<JobRun, JobError> {
        let (run, targets) = self.prepare(job_type, prisons).await?;
        self.execute(run.id, job_type, flags, targets).await;
        self.state
            .store
            .job_run(run.id)
            .await?
            .ok_or(JobError::RunMissing(run.id))
    }

    async fn prepare(
        &self,
        job_type: JobType,
        prisons: Option<Vec<String>>,
    ) -> Result<(JobRun, Vec<String>), JobError> {
        let targets = self.eligible_prisons(prisons.as_deref()).await?;
        let run = JobRun::new(job_type, targets.len() as i32, self.state.clock.now());
        self.state.store.insert_job_run(&run).await?;
        info!(
            job_run_id = %run.id,
            job_type = %job_type,
            prisons = targets.len(),
            "job run started"
        );
        Ok((run, targets))
    }

    /// Prisons with activities rolled out, narrowed to `requested` when given.
    async fn eligible_prisons(&self, requested: Option<&[String]>) -> Result<Vec<String>, JobError> {
        let enabled: BTreeSet<String> = self
            .state
            .store
            .rollout_prisons()
            .await?
            .into_iter()
            .filter(|prison| prison.activities_enabled)
            .map(|prison| prison.prison_code)
            .collect();

        let Some(requested) = requested else {
            return Ok(enabled.into_iter().collect());
        };
        let mut targets = BTreeSet::new();
        for code in requested {
            if enabled.contains(code) {
                targets.insert(code.clone());
            } else {
                warn!(prison_code = %code, "prison is not enabled for activities; skipping");
            }
        }
        Ok(targets.into_iter().collect())
    }

    async fn execute(&self, run_id: Uuid, job_type: JobType, flags: JobFlags, prisons: Vec<String>) {
        let concurrency = self.state.config.scheduling.job_concurrency.max(1);
        stream::iter(prisons)
            .map(|prison_code| async move {
                let outcome = self.run_prison(job_type, flags, &prison_code).await;
                self.record(run_id, &prison_code, outcome).await;
            })
            .buffer_unordered(concurrency)
            .collect::<Vec<()>>()
            .await;

        match self.state.store.job_run(run_id).await {
            Ok(Some(run)) => info!(
                job_run_id = %run_id,
                job_type = %job_type,
                successful = ?run.successful,
                total = run.total_subtasks,
                completed = run.completed_subtasks,
                failed = run.failed_subtasks,
                "job run finished"
            ),
            Ok(None) => error!(job_run_id = %run_id, "job run record missing after execution"),
            Err(err) => error!(job_run_id = %run_id, error = %err, "failed to read job run"),
        }
    }

    async fn run_prison(&self, job_type: JobType, flags: JobFlags, prison_code: &str) -> SubtaskOutcome {
        let mut failures = Vec::new();
        for stage in job_type.stages() {
            let Some(handler) = self.handlers.get(stage) else {
                error!(job_type = %stage, "no handler registered for job type");
                failures.push(format!("{stage}: no handler registered"));
                continue;
            };
            match handler.handle(&self.state, prison_code, flags).await {
                JobExecution::Success => {}
                JobExecution::Failed { error } => {
                    error!(prison_code, job_type = %stage, %error, "prison subtask failed");
                    failures.push(format!("{stage}: {error}"));
                }
            }
        }

        if failures.is_empty() {
            SubtaskOutcome::Succeeded
        } else {
            SubtaskOutcome::Failed(format!("{prison_code}: {}", failures.join("; ")))
        }
    }

    async fn record(&self, run_id: Uuid, prison_code: &str, outcome: SubtaskOutcome) {
        let now = self.state.clock.now();
        if let Err(err) = self
            .state
            .store
            .record_subtask(run_id, prison_code, &outcome, now)
            .await
        {
            error!(job_run_id = %run_id, prison_code, error = %err, "failed to record subtask outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(3, 0, 0)
            .unwrap()
    }

    #[test]
    fn job_type_parses_its_path_name() {
        for job_type in [
            JobType::CreateScheduledInstances,
            JobType::CreateAttendanceRecords,
            JobType::ManageAllocations,
            JobType::Daily,
        ] {
            assert_eq!(job_type.as_str().parse::<JobType>().unwrap(), job_type);
        }
        assert!("reindex".parse::<JobType>().is_err());
    }

    #[test]
    fn daily_runs_every_stage_in_order() {
        assert_eq!(
            JobType::Daily.stages(),
            &[
                JobType::CreateScheduledInstances,
                JobType::CreateAttendanceRecords,
                JobType::ManageAllocations,
            ]
        );
    }

    #[test]
    fn run_settles_only_when_every_subtask_reports() {
        let mut run = JobRun::new(JobType::Daily, 2, at());
        run.apply_outcome(&SubtaskOutcome::Succeeded, at());
        assert_eq!(run.successful, None);
        run.apply_outcome(&SubtaskOutcome::Failed("RSI: regime missing".into()), at());
        assert_eq!(run.successful, Some(false));
        assert_eq!(run.completed_subtasks, 1);
        assert_eq!(run.failed_subtasks, 1);
        assert_eq!(run.last_error.as_deref(), Some("RSI: regime missing"));
    }

    #[test]
    fn run_without_prisons_is_finished_immediately() {
        let run = JobRun::new(JobType::ManageAllocations, 0, at());
        assert_eq!(run.successful, Some(true));
        assert_eq!(run.finished_at, Some(at()));
    }
}
