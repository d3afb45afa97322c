//! Persistence seam. Every uniqueness rule the engine relies on for
//! idempotence is enforced here and surfaced as [`StoreError::Conflict`].

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;
use uuid::Uuid;

use crate::allocation::Allocation;
use crate::attendance::Attendance;
use crate::jobs::{JobRun, RolloutPrison, SubtaskOutcome};
use crate::regime::PrisonRegime;
use crate::schedule::{Schedule, ScheduledInstance};
use crate::waiting_list::WaitingList;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(DieselError),
    #[error("database pool error: {0}")]
    Pool(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<DieselError> for StoreError {
    fn from(value: DieselError) -> Self {
        match value {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(info.message().to_string())
            }
            DieselError::NotFound => StoreError::NotFound("row".into()),
            other => StoreError::Database(other),
        }
    }
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ActivityStore: Send + Sync + 'static {
    async fn rollout_prisons(&self) -> StoreResult<Vec<RolloutPrison>>;

    async fn save_rollout_prison(&self, prison: &RolloutPrison) -> StoreResult<()>;

    async fn regimes_for_prison(&self, prison_code: &str) -> StoreResult<Vec<PrisonRegime>>;

    async fn replace_regime(&self, prison_code: &str, rows: &[PrisonRegime]) -> StoreResult<()>;

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()>;

    /// Overwrites the schedule row and replaces its slots.
    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()>;

    async fn schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>>;

    async fn schedules_for_prison(&self, prison_code: &str) -> StoreResult<Vec<Schedule>>;

    /// Conflict when the (schedule, date, time slot) key already exists.
    async fn insert_instance(&self, instance: &ScheduledInstance) -> StoreResult<()>;

    async fn update_instance(&self, instance: &ScheduledInstance) -> StoreResult<()>;

    async fn instance(&self, id: Uuid) -> StoreResult<Option<ScheduledInstance>>;

    async fn instances_for_schedule(
        &self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<ScheduledInstance>>;

    async fn instances_for_prison_on(
        &self,
        prison_code: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<ScheduledInstance>>;

    /// Deletes instances dated strictly after `after` that have no attendance rows.
    async fn delete_unattended_instances_after(
        &self,
        schedule_id: Uuid,
        after: NaiveDate,
    ) -> StoreResult<usize>;

    /// Conflict when the prisoner already holds a non-ended allocation on the schedule.
    async fn insert_allocation(&self, allocation: &Allocation) -> StoreResult<()>;

    async fn allocation(&self, id: Uuid) -> StoreResult<Option<Allocation>>;

    /// Conflict when `allocation.version` is stale; returns the row with its new version.
    async fn update_allocation(&self, allocation: &Allocation) -> StoreResult<Allocation>;

    async fn allocations_for_schedule(&self, schedule_id: Uuid) -> StoreResult<Vec<Allocation>>;

    async fn live_allocations_for_prison(&self, prison_code: &str) -> StoreResult<Vec<Allocation>>;

    async fn live_allocations_for_prisoner(
        &self,
        prisoner_number: &str,
        prison_code: Option<&str>,
    ) -> StoreResult<Vec<Allocation>>;

    async fn insert_waiting_list(&self, application: &WaitingList) -> StoreResult<()>;

    async fn waiting_list(&self, id: Uuid) -> StoreResult<Option<WaitingList>>;

    /// Conflict when `application.version` is stale.
    async fn update_waiting_list(&self, application: &WaitingList) -> StoreResult<WaitingList>;

    async fn pending_waiting_lists(
        &self,
        prisoner_number: &str,
        prison_code: Option<&str>,
        schedule_id: Option<Uuid>,
    ) -> StoreResult<Vec<WaitingList>>;

    /// Conflict when the (instance, prisoner) key already exists.
    async fn insert_attendance(&self, attendance: &Attendance) -> StoreResult<()>;

    async fn update_attendance(&self, attendance: &Attendance) -> StoreResult<()>;

    async fn attendances_for_instance(&self, instance_id: Uuid) -> StoreResult<Vec<Attendance>>;

    async fn insert_job_run(&self, run: &JobRun) -> StoreResult<()>;

    async fn job_run(&self, id: Uuid) -> StoreResult<Option<JobRun>>;

    /// Records one prison's outcome for a run. A second record for the same
    /// prison is ignored; counters are bumped in place.
    async fn record_subtask(
        &self,
        run_id: Uuid,
        prison_code: &str,
        outcome: &SubtaskOutcome,
        at: NaiveDateTime,
    ) -> StoreResult<JobRun>;
}
