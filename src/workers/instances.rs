use async_trait::async_trait;
use chrono::Duration;
use tracing::{error, info};

use crate::{
    jobs::{JobFlags, JobType},
    materializer::InstanceMaterializer,
    regime::RegimeRegistry,
    state::AppState,
};

use super::{JobExecution, JobHandler};

pub struct CreateScheduledInstancesJob;

impl CreateScheduledInstancesJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for CreateScheduledInstancesJob {
    fn job_type(&self) -> JobType {
        JobType::CreateScheduledInstances
    }

    async fn handle(&self, state: &AppState, prison_code: &str, _flags: JobFlags) -> JobExecution {
        let rows = match state.store.regimes_for_prison(prison_code).await {
            Ok(rows) => rows,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("failed to load regime: {err}"),
                }
            }
        };
        let registry = match RegimeRegistry::from_rows(rows) {
            Ok(registry) => registry,
            Err(err) => {
                return JobExecution::Failed {
                    error: err.to_string(),
                }
            }
        };
        let schedules = match state.store.schedules_for_prison(prison_code).await {
            Ok(schedules) => schedules,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("failed to load schedules: {err}"),
                }
            }
        };

        let today = state.clock.today();
        let horizon = today + Duration::days(state.config.scheduling.days_in_advance);
        let materializer = InstanceMaterializer::new(state, &registry);

        let mut created = 0;
        let mut failures = Vec::new();
        for schedule in schedules.iter().filter(|schedule| !schedule.has_ended(today)) {
            match materializer.materialize(schedule, today, horizon).await {
                Ok(count) => created += count,
                Err(err) => {
                    error!(
                        prison_code,
                        schedule_id = %schedule.id,
                        error = %err,
                        "failed to materialize schedule"
                    );
                    failures.push(format!("schedule {}: {err}", schedule.id));
                }
            }
        }

        info!(prison_code, created, %horizon, "scheduled instances created");
        JobExecution::from_failures(failures)
    }
}
