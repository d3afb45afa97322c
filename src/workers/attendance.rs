use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    attendance::AttendanceGenerator,
    jobs::{JobFlags, JobType},
    schedule::Schedule,
    state::AppState,
};

use super::{JobExecution, JobHandler};

/// Creates today's attendance rows for every instance in the prison.
pub struct CreateAttendanceRecordsJob;

impl CreateAttendanceRecordsJob {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for CreateAttendanceRecordsJob {
    fn job_type(&self) -> JobType {
        JobType::CreateAttendanceRecords
    }

    async fn handle(&self, state: &AppState, prison_code: &str, _flags: JobFlags) -> JobExecution {
        let today = state.clock.today();
        let instances = match state.store.instances_for_prison_on(prison_code, today).await {
            Ok(instances) => instances,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("failed to load instances: {err}"),
                }
            }
        };

        let generator = AttendanceGenerator::new(state);
        let mut schedules: HashMap<Uuid, Schedule> = HashMap::new();
        let mut created = 0;
        let mut failures = Vec::new();
        for instance in &instances {
            if !schedules.contains_key(&instance.schedule_id) {
                match state.store.schedule(instance.schedule_id).await {
                    Ok(Some(schedule)) => {
                        schedules.insert(schedule.id, schedule);
                    }
                    Ok(None) => {
                        failures.push(format!("schedule {} not found", instance.schedule_id));
                        continue;
                    }
                    Err(err) => {
                        failures.push(format!("schedule {}: {err}", instance.schedule_id));
                        continue;
                    }
                }
            }
            let Some(schedule) = schedules.get(&instance.schedule_id) else {
                continue;
            };

            match generator.generate(schedule, instance).await {
                Ok(rows) => created += rows.len(),
                Err(err) => {
                    error!(
                        prison_code,
                        instance_id = %instance.id,
                        error = %err,
                        "failed to create attendance"
                    );
                    failures.push(format!("instance {}: {err}", instance.id));
                }
            }
        }

        info!(prison_code, instances = instances.len(), created, "attendance records created");
        JobExecution::from_failures(failures)
    }
}
