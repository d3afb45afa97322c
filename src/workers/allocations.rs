use async_trait::async_trait;

use crate::{
    jobs::{JobFlags, JobType},
    lifecycle::AllocationLifecycle,
    state::AppState,
};

use super::{JobExecution, JobHandler};

pub struct ManageAllocationsJob;

impl ManageAllocationsJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for ManageAllocationsJob {
    fn job_type(&self) -> JobType {
        JobType::ManageAllocations
    }

    async fn handle(&self, state: &AppState, prison_code: &str, flags: JobFlags) -> JobExecution {
        match AllocationLifecycle::new(state)
            .run_date_pass(prison_code, flags)
            .await
        {
            Ok(report) => JobExecution::from_failures(report.failures),
            Err(err) => JobExecution::Failed {
                error: err.to_string(),
            },
        }
    }
}
