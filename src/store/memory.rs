use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    allocation::Allocation,
    attendance::Attendance,
    jobs::{JobRun, RolloutPrison, SubtaskOutcome},
    regime::PrisonRegime,
    schedule::{Schedule, ScheduledInstance},
    waiting_list::WaitingList,
};

use super::{ActivityStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    rollout: BTreeMap<String, RolloutPrison>,
    regimes: HashMap<String, Vec<PrisonRegime>>,
    schedules: HashMap<Uuid, Schedule>,
    instances: HashMap<Uuid, ScheduledInstance>,
    allocations: HashMap<Uuid, Allocation>,
    waiting_lists: HashMap<Uuid, WaitingList>,
    attendances: HashMap<Uuid, Attendance>,
    job_runs: HashMap<Uuid, JobRun>,
    subtasks: HashSet<(Uuid, String)>,
}

/// In-process store with the same keys and version checks as the Postgres one.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_instances(mut instances: Vec<ScheduledInstance>) -> Vec<ScheduledInstance> {
    instances.sort_by_key(|instance| (instance.session_date, instance.start_time, instance.time_slot));
    instances
}

fn sorted_allocations(mut allocations: Vec<Allocation>) -> Vec<Allocation> {
    allocations.sort_by(|a, b| {
        (a.start_date, &a.prisoner_number, a.id).cmp(&(b.start_date, &b.prisoner_number, b.id))
    });
    allocations
}

#[async_trait]
impl ActivityStore for MemoryStore {
    async fn rollout_prisons(&self) -> StoreResult<Vec<RolloutPrison>> {
        Ok(self.tables.lock().await.rollout.values().cloned().collect())
    }

    async fn save_rollout_prison(&self, prison: &RolloutPrison) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .rollout
            .insert(prison.prison_code.clone(), prison.clone());
        Ok(())
    }

    async fn regimes_for_prison(&self, prison_code: &str) -> StoreResult<Vec<PrisonRegime>> {
        Ok(self
            .tables
            .lock()
            .await
            .regimes
            .get(prison_code)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_regime(&self, prison_code: &str, rows: &[PrisonRegime]) -> StoreResult<()> {
        self.tables
            .lock()
            .await
            .regimes
            .insert(prison_code.to_string(), rows.to_vec());
        Ok(())
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.schedules.contains_key(&schedule.id) {
            return Err(StoreError::Conflict(format!("schedule {} exists", schedule.id)));
        }
        tables.schedules.insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.schedules.get_mut(&schedule.id) {
            Some(existing) => {
                *existing = schedule.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("schedule {}", schedule.id))),
        }
    }

    async fn schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        Ok(self.tables.lock().await.schedules.get(&id).cloned())
    }

    async fn schedules_for_prison(&self, prison_code: &str) -> StoreResult<Vec<Schedule>> {
        let tables = self.tables.lock().await;
        let mut schedules: Vec<Schedule> = tables
            .schedules
            .values()
            .filter(|schedule| schedule.prison_code == prison_code)
            .cloned()
            .collect();
        schedules.sort_by_key(|schedule| (schedule.start_date, schedule.id));
        Ok(schedules)
    }

    async fn insert_instance(&self, instance: &ScheduledInstance) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables.instances.values().any(|existing| {
            existing.schedule_id == instance.schedule_id
                && existing.session_date == instance.session_date
                && existing.time_slot == instance.time_slot
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "instance for schedule {} on {} ({}) exists",
                instance.schedule_id, instance.session_date, instance.time_slot
            )));
        }
        tables.instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn update_instance(&self, instance: &ScheduledInstance) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.instances.get_mut(&instance.id) {
            Some(existing) => {
                *existing = instance.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("instance {}", instance.id))),
        }
    }

    async fn instance(&self, id: Uuid) -> StoreResult<Option<ScheduledInstance>> {
        Ok(self.tables.lock().await.instances.get(&id).cloned())
    }

    async fn instances_for_schedule(
        &self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<ScheduledInstance>> {
        let tables = self.tables.lock().await;
        Ok(sorted_instances(
            tables
                .instances
                .values()
                .filter(|instance| {
                    instance.schedule_id == schedule_id
                        && instance.session_date >= from
                        && instance.session_date <= to
                })
                .cloned()
                .collect(),
        ))
    }

    async fn instances_for_prison_on(
        &self,
        prison_code: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<ScheduledInstance>> {
        let tables = self.tables.lock().await;
        Ok(sorted_instances(
            tables
                .instances
                .values()
                .filter(|instance| {
                    instance.session_date == date
                        && tables
                            .schedules
                            .get(&instance.schedule_id)
                            .is_some_and(|schedule| schedule.prison_code == prison_code)
                })
                .cloned()
                .collect(),
        ))
    }

    async fn delete_unattended_instances_after(
        &self,
        schedule_id: Uuid,
        after: NaiveDate,
    ) -> StoreResult<usize> {
        let mut tables = self.tables.lock().await;
        let attended: HashSet<Uuid> = tables
            .attendances
            .values()
            .map(|attendance| attendance.scheduled_instance_id)
            .collect();
        let before = tables.instances.len();
        tables.instances.retain(|id, instance| {
            instance.schedule_id != schedule_id
                || instance.session_date <= after
                || attended.contains(id)
        });
        Ok(before - tables.instances.len())
    }

    async fn insert_allocation(&self, allocation: &Allocation) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables.allocations.values().any(|existing| {
            existing.schedule_id == allocation.schedule_id
                && existing.prisoner_number == allocation.prisoner_number
                && !existing.is_ended()
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "prisoner {} already has a live allocation on schedule {}",
                allocation.prisoner_number, allocation.schedule_id
            )));
        }
        tables.allocations.insert(allocation.id, allocation.clone());
        Ok(())
    }

    async fn allocation(&self, id: Uuid) -> StoreResult<Option<Allocation>> {
        Ok(self.tables.lock().await.allocations.get(&id).cloned())
    }

    async fn update_allocation(&self, allocation: &Allocation) -> StoreResult<Allocation> {
        let mut tables = self.tables.lock().await;
        let existing = tables
            .allocations
            .get_mut(&allocation.id)
            .ok_or_else(|| StoreError::NotFound(format!("allocation {}", allocation.id)))?;
        if existing.version != allocation.version {
            return Err(StoreError::Conflict(format!(
                "allocation {} is at version {}, not {}",
                allocation.id, existing.version, allocation.version
            )));
        }
        let mut saved = allocation.clone();
        saved.version += 1;
        *existing = saved.clone();
        Ok(saved)
    }

    async fn allocations_for_schedule(&self, schedule_id: Uuid) -> StoreResult<Vec<Allocation>> {
        let tables = self.tables.lock().await;
        Ok(sorted_allocations(
            tables
                .allocations
                .values()
                .filter(|allocation| allocation.schedule_id == schedule_id)
                .cloned()
                .collect(),
        ))
    }

    async fn live_allocations_for_prison(&self, prison_code: &str) -> StoreResult<Vec<Allocation>> {
        let tables = self.tables.lock().await;
        Ok(sorted_allocations(
            tables
                .allocations
                .values()
                .filter(|allocation| allocation.prison_code == prison_code && !allocation.is_ended())
                .cloned()
                .collect(),
        ))
    }

    async fn live_allocations_for_prisoner(
        &self,
        prisoner_number: &str,
        prison_code: Option<&str>,
    ) -> StoreResult<Vec<Allocation>> {
        let tables = self.tables.lock().await;
        Ok(sorted_allocations(
            tables
                .allocations
                .values()
                .filter(|allocation| {
                    allocation.prisoner_number == prisoner_number
                        && !allocation.is_ended()
                        && prison_code.map_or(true, |code| allocation.prison_code == code)
                })
                .cloned()
                .collect(),
        ))
    }

    async fn insert_waiting_list(&self, application: &WaitingList) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.waiting_lists.contains_key(&application.id) {
            return Err(StoreError::Conflict(format!(
                "waiting list {} exists",
                application.id
            )));
        }
        tables.waiting_lists.insert(application.id, application.clone());
        Ok(())
    }

    async fn waiting_list(&self, id: Uuid) -> StoreResult<Option<WaitingList>> {
        Ok(self.tables.lock().await.waiting_lists.get(&id).cloned())
    }

    async fn update_waiting_list(&self, application: &WaitingList) -> StoreResult<WaitingList> {
        let mut tables = self.tables.lock().await;
        let existing = tables
            .waiting_lists
            .get_mut(&application.id)
            .ok_or_else(|| StoreError::NotFound(format!("waiting list {}", application.id)))?;
        if existing.version != application.version {
            return Err(StoreError::Conflict(format!(
                "waiting list {} is at version {}, not {}",
                application.id, existing.version, application.version
            )));
        }
        let mut saved = application.clone();
        saved.version += 1;
        *existing = saved.clone();
        Ok(saved)
    }

    async fn pending_waiting_lists(
        &self,
        prisoner_number: &str,
        prison_code: Option<&str>,
        schedule_id: Option<Uuid>,
    ) -> StoreResult<Vec<WaitingList>> {
        let tables = self.tables.lock().await;
        let mut pending: Vec<WaitingList> = tables
            .waiting_lists
            .values()
            .filter(|application| {
                application.is_pending()
                    && application.prisoner_number == prisoner_number
                    && prison_code.map_or(true, |code| application.prison_code == code)
                    && schedule_id.map_or(true, |id| application.schedule_id == id)
            })
            .cloned()
            .collect();
        pending.sort_by_key(|application| (application.application_date, application.id));
        Ok(pending)
    }

    async fn insert_attendance(&self, attendance: &Attendance) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let duplicate = tables.attendances.values().any(|existing| {
            existing.scheduled_instance_id == attendance.scheduled_instance_id
                && existing.prisoner_number == attendance.prisoner_number
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "attendance for {} on instance {} exists",
                attendance.prisoner_number, attendance.scheduled_instance_id
            )));
        }
        tables.attendances.insert(attendance.id, attendance.clone());
        Ok(())
    }

    async fn update_attendance(&self, attendance: &Attendance) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        match tables.attendances.get_mut(&attendance.id) {
            Some(existing) => {
                *existing = attendance.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("attendance {}", attendance.id))),
        }
    }

    async fn attendances_for_instance(&self, instance_id: Uuid) -> StoreResult<Vec<Attendance>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Attendance> = tables
            .attendances
            .values()
            .filter(|attendance| attendance.scheduled_instance_id == instance_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.prisoner_number.cmp(&b.prisoner_number));
        Ok(rows)
    }

    async fn insert_job_run(&self, run: &JobRun) -> StoreResult<()> {
        self.tables.lock().await.job_runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn job_run(&self, id: Uuid) -> StoreResult<Option<JobRun>> {
        Ok(self.tables.lock().await.job_runs.get(&id).cloned())
    }

    async fn record_subtask(
        &self,
        run_id: Uuid,
        prison_code: &str,
        outcome: &SubtaskOutcome,
        at: NaiveDateTime,
    ) -> StoreResult<JobRun> {
        let mut tables = self.tables.lock().await;
        if !tables.job_runs.contains_key(&run_id) {
            return Err(StoreError::NotFound(format!("job run {run_id}")));
        }
        let first_report = tables.subtasks.insert((run_id, prison_code.to_string()));
        let run = tables
            .job_runs
            .get_mut(&run_id)
            .ok_or_else(|| StoreError::NotFound(format!("job run {run_id}")))?;
        if first_report {
            run.apply_outcome(outcome, at);
        }
        Ok(run.clone())
    }
}
