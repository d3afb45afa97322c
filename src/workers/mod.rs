use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info};

use crate::{
    jobs::{JobError, JobFlags, JobOrchestrator, JobRun, JobType},
    state::AppState,
};

pub mod allocations;
pub mod attendance;
pub mod instances;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobExecution {
    Success,
    Failed { error: String },
}

impl JobExecution {
    pub(crate) fn from_failures(failures: Vec<String>) -> Self {
        if failures.is_empty() {
            JobExecution::Success
        } else {
            JobExecution::Failed {
                error: failures.join("; "),
            }
        }
    }
}

/// One per-prison step of a job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;
    async fn handle(&self, state: &AppState, prison_code: &str, flags: JobFlags) -> JobExecution;
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![
        Arc::new(instances::CreateScheduledInstancesJob::new()),
        Arc::new(attendance::CreateAttendanceRecordsJob::new()),
        Arc::new(allocations::ManageAllocationsJob::new()),
    ]
}

/// Triggers the daily job for every enabled prison on a fixed interval.
pub struct Scheduler {
    orchestrator: JobOrchestrator,
    interval: Duration,
}

impl Scheduler {
    pub fn new(orchestrator: JobOrchestrator, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "scheduler started");
        loop {
            if let Err(err) = self.tick().await {
                error!(error = %err, "scheduled job run failed");
            }
            sleep(self.interval).await;
        }
    }

    pub async fn tick(&self) -> Result<JobRun, JobError> {
        self.orchestrator
            .run(JobType::Daily, JobFlags::default(), None)
            .await
    }
}
