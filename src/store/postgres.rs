use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use tokio::task;
use uuid::Uuid;

use crate::{
    allocation::Allocation,
    attendance::Attendance,
    db::PgPool,
    jobs::{JobRun, RolloutPrison, SubtaskOutcome},
    models::{
        AllocationRow, AttendanceRow, InstanceRow, JobRunRow, NewJobSubtask, PrisonRegimeRow,
        RolloutPrisonRow, ScheduleRow, SlotRow, WaitingListRow,
    },
    regime::PrisonRegime,
    schedule::{Schedule, ScheduledInstance},
    schema::{
        allocations, attendances, job_runs, job_subtasks, prison_regimes, rollout_prisons,
        schedule_slots, scheduled_instances, schedules, waiting_lists,
    },
    waiting_list::WaitingList,
};

use super::{ActivityStore, StoreError, StoreResult};

const ENDED: &str = "ENDED";
const PENDING: &str = "PENDING";

/// Diesel-backed store. Every call runs on the blocking pool with its own
/// pooled connection.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<T, F>(&self, work: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| StoreError::Pool(err.to_string()))?;
            work(&mut conn)
        })
        .await
        .map_err(|err| StoreError::Pool(format!("blocking task failed: {err}")))?
    }
}

fn convert<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

fn load_schedules(conn: &mut PgConnection, rows: Vec<ScheduleRow>) -> StoreResult<Vec<Schedule>> {
    let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
    let slot_rows: Vec<SlotRow> = schedule_slots::table
        .filter(schedule_slots::schedule_id.eq_any(&ids))
        .order((schedule_slots::week_number.asc(), schedule_slots::time_slot.asc()))
        .select(SlotRow::as_select())
        .load(conn)?;

    let mut slots_by_schedule: HashMap<Uuid, Vec<SlotRow>> = HashMap::new();
    for slot in slot_rows {
        slots_by_schedule.entry(slot.schedule_id).or_default().push(slot);
    }
    rows.into_iter()
        .map(|row| {
            let slots = slots_by_schedule.remove(&row.id).unwrap_or_default();
            row.into_schedule(slots)
        })
        .collect()
}

fn insert_slots(conn: &mut PgConnection, schedule: &Schedule) -> StoreResult<()> {
    let rows: Vec<SlotRow> = schedule
        .slots
        .iter()
        .map(|slot| SlotRow::from_slot(schedule.id, slot))
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(schedule_slots::table)
            .values(&rows)
            .execute(conn)?;
    }
    Ok(())
}

#[async_trait]
impl ActivityStore for PgStore {
    async fn rollout_prisons(&self) -> StoreResult<Vec<RolloutPrison>> {
        self.with_conn(|conn| {
            let rows: Vec<RolloutPrisonRow> = rollout_prisons::table
                .order(rollout_prisons::prison_code.asc())
                .select(RolloutPrisonRow::as_select())
                .load(conn)?;
            Ok(rows.into_iter().map(RolloutPrison::from).collect())
        })
        .await
    }

    async fn save_rollout_prison(&self, prison: &RolloutPrison) -> StoreResult<()> {
        let row = RolloutPrisonRow::from(prison);
        self.with_conn(move |conn| {
            diesel::insert_into(rollout_prisons::table)
                .values(&row)
                .on_conflict(rollout_prisons::prison_code)
                .do_update()
                .set(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn regimes_for_prison(&self, prison_code: &str) -> StoreResult<Vec<PrisonRegime>> {
        let prison_code = prison_code.to_string();
        self.with_conn(move |conn| {
            let rows: Vec<PrisonRegimeRow> = prison_regimes::table
                .filter(prison_regimes::prison_code.eq(&prison_code))
                .order(prison_regimes::day_of_week.asc())
                .select(PrisonRegimeRow::as_select())
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn replace_regime(&self, prison_code: &str, rows: &[PrisonRegime]) -> StoreResult<()> {
        let prison_code = prison_code.to_string();
        let rows: Vec<PrisonRegimeRow> = rows.iter().map(PrisonRegimeRow::from).collect();
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                diesel::delete(
                    prison_regimes::table.filter(prison_regimes::prison_code.eq(&prison_code)),
                )
                .execute(conn)?;
                if !rows.is_empty() {
                    diesel::insert_into(prison_regimes::table)
                        .values(&rows)
                        .execute(conn)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        let row = ScheduleRow::try_from(schedule)?;
        let schedule = schedule.clone();
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                diesel::insert_into(schedules::table)
                    .values(&row)
                    .execute(conn)?;
                insert_slots(conn, &schedule)
            })
        })
        .await
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        let row = ScheduleRow::try_from(schedule)?;
        let schedule = schedule.clone();
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let updated = diesel::update(schedules::table.find(row.id))
                    .set(&row)
                    .execute(conn)?;
                if updated == 0 {
                    return Err(StoreError::NotFound(format!("schedule {}", row.id)));
                }
                diesel::delete(
                    schedule_slots::table.filter(schedule_slots::schedule_id.eq(row.id)),
                )
                .execute(conn)?;
                insert_slots(conn, &schedule)
            })
        })
        .await
    }

    async fn schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        self.with_conn(move |conn| {
            let row: Option<ScheduleRow> = schedules::table
                .find(id)
                .select(ScheduleRow::as_select())
                .first(conn)
                .optional()?;
            match row {
                Some(row) => Ok(load_schedules(conn, vec![row])?.pop()),
                None => Ok(None),
            }
        })
        .await
    }

    async fn schedules_for_prison(&self, prison_code: &str) -> StoreResult<Vec<Schedule>> {
        let prison_code = prison_code.to_string();
        self.with_conn(move |conn| {
            let rows: Vec<ScheduleRow> = schedules::table
                .filter(schedules::prison_code.eq(&prison_code))
                .order((schedules::start_date.asc(), schedules::id.asc()))
                .select(ScheduleRow::as_select())
                .load(conn)?;
            load_schedules(conn, rows)
        })
        .await
    }

    async fn insert_instance(&self, instance: &ScheduledInstance) -> StoreResult<()> {
        let row = InstanceRow::from(instance);
        self.with_conn(move |conn| {
            diesel::insert_into(scheduled_instances::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_instance(&self, instance: &ScheduledInstance) -> StoreResult<()> {
        let row = InstanceRow::from(instance);
        self.with_conn(move |conn| {
            let updated = diesel::update(scheduled_instances::table.find(row.id))
                .set(&row)
                .execute(conn)?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("instance {}", row.id)));
            }
            Ok(())
        })
        .await
    }

    async fn instance(&self, id: Uuid) -> StoreResult<Option<ScheduledInstance>> {
        self.with_conn(move |conn| {
            let row: Option<InstanceRow> = scheduled_instances::table
                .find(id)
                .select(InstanceRow::as_select())
                .first(conn)
                .optional()?;
            row.map(ScheduledInstance::try_from).transpose()
        })
        .await
    }

    async fn instances_for_schedule(
        &self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<ScheduledInstance>> {
        self.with_conn(move |conn| {
            let rows: Vec<InstanceRow> = scheduled_instances::table
                .filter(scheduled_instances::schedule_id.eq(schedule_id))
                .filter(scheduled_instances::session_date.ge(from))
                .filter(scheduled_instances::session_date.le(to))
                .order((
                    scheduled_instances::session_date.asc(),
                    scheduled_instances::start_time.asc(),
                ))
                .select(InstanceRow::as_select())
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn instances_for_prison_on(
        &self,
        prison_code: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<ScheduledInstance>> {
        let prison_code = prison_code.to_string();
        self.with_conn(move |conn| {
            let rows: Vec<InstanceRow> = scheduled_instances::table
                .inner_join(schedules::table)
                .filter(schedules::prison_code.eq(&prison_code))
                .filter(scheduled_instances::session_date.eq(date))
                .order(scheduled_instances::start_time.asc())
                .select(InstanceRow::as_select())
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn delete_unattended_instances_after(
        &self,
        schedule_id: Uuid,
        after: NaiveDate,
    ) -> StoreResult<usize> {
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let candidates: Vec<Uuid> = scheduled_instances::table
                    .filter(scheduled_instances::schedule_id.eq(schedule_id))
                    .filter(scheduled_instances::session_date.gt(after))
                    .select(scheduled_instances::id)
                    .for_update()
                    .load(conn)?;
                if candidates.is_empty() {
                    return Ok(0);
                }
                let attended: HashSet<Uuid> = attendances::table
                    .filter(attendances::scheduled_instance_id.eq_any(&candidates))
                    .select(attendances::scheduled_instance_id)
                    .distinct()
                    .load::<Uuid>(conn)?
                    .into_iter()
                    .collect();
                let doomed: Vec<Uuid> = candidates
                    .into_iter()
                    .filter(|id| !attended.contains(id))
                    .collect();
                let removed = diesel::delete(
                    scheduled_instances::table.filter(scheduled_instances::id.eq_any(&doomed)),
                )
                .execute(conn)?;
                Ok(removed)
            })
        })
        .await
    }

    async fn insert_allocation(&self, allocation: &Allocation) -> StoreResult<()> {
        let row = AllocationRow::try_from(allocation)?;
        self.with_conn(move |conn| {
            diesel::insert_into(allocations::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn allocation(&self, id: Uuid) -> StoreResult<Option<Allocation>> {
        self.with_conn(move |conn| {
            let row: Option<AllocationRow> = allocations::table
                .find(id)
                .select(AllocationRow::as_select())
                .first(conn)
                .optional()?;
            row.map(Allocation::try_from).transpose()
        })
        .await
    }

    async fn update_allocation(&self, allocation: &Allocation) -> StoreResult<Allocation> {
        let mut row = AllocationRow::try_from(allocation)?;
        let expected = row.version;
        row.version += 1;
        self.with_conn(move |conn| {
            let updated = diesel::update(
                allocations::table
                    .filter(allocations::id.eq(row.id))
                    .filter(allocations::version.eq(expected)),
            )
            .set(&row)
            .execute(conn)?;
            if updated == 0 {
                let exists: Option<Uuid> = allocations::table
                    .find(row.id)
                    .select(allocations::id)
                    .first(conn)
                    .optional()?;
                return Err(match exists {
                    Some(_) => StoreError::Conflict(format!(
                        "allocation {} is no longer at version {expected}",
                        row.id
                    )),
                    None => StoreError::NotFound(format!("allocation {}", row.id)),
                });
            }
            Allocation::try_from(row)
        })
        .await
    }

    async fn allocations_for_schedule(&self, schedule_id: Uuid) -> StoreResult<Vec<Allocation>> {
        self.with_conn(move |conn| {
            let rows: Vec<AllocationRow> = allocations::table
                .filter(allocations::schedule_id.eq(schedule_id))
                .order((allocations::start_date.asc(), allocations::prisoner_number.asc()))
                .select(AllocationRow::as_select())
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn live_allocations_for_prison(&self, prison_code: &str) -> StoreResult<Vec<Allocation>> {
        let prison_code = prison_code.to_string();
        self.with_conn(move |conn| {
            let rows: Vec<AllocationRow> = allocations::table
                .filter(allocations::prison_code.eq(&prison_code))
                .filter(allocations::status.ne(ENDED))
                .order((allocations::start_date.asc(), allocations::prisoner_number.asc()))
                .select(AllocationRow::as_select())
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn live_allocations_for_prisoner(
        &self,
        prisoner_number: &str,
        prison_code: Option<&str>,
    ) -> StoreResult<Vec<Allocation>> {
        let prisoner_number = prisoner_number.to_string();
        let prison_code = prison_code.map(str::to_string);
        self.with_conn(move |conn| {
            let mut query = allocations::table
                .select(AllocationRow::as_select())
                .filter(allocations::prisoner_number.eq(prisoner_number))
                .filter(allocations::status.ne(ENDED))
                .order(allocations::start_date.asc())
                .into_boxed();
            if let Some(code) = prison_code {
                query = query.filter(allocations::prison_code.eq(code));
            }
            let rows: Vec<AllocationRow> = query.load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn insert_waiting_list(&self, application: &WaitingList) -> StoreResult<()> {
        let row = WaitingListRow::from(application);
        self.with_conn(move |conn| {
            diesel::insert_into(waiting_lists::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn waiting_list(&self, id: Uuid) -> StoreResult<Option<WaitingList>> {
        self.with_conn(move |conn| {
            let row: Option<WaitingListRow> = waiting_lists::table
                .find(id)
                .select(WaitingListRow::as_select())
                .first(conn)
                .optional()?;
            row.map(WaitingList::try_from).transpose()
        })
        .await
    }

    async fn update_waiting_list(&self, application: &WaitingList) -> StoreResult<WaitingList> {
        let mut row = WaitingListRow::from(application);
        let expected = row.version;
        row.version += 1;
        self.with_conn(move |conn| {
            let updated = diesel::update(
                waiting_lists::table
                    .filter(waiting_lists::id.eq(row.id))
                    .filter(waiting_lists::version.eq(expected)),
            )
            .set(&row)
            .execute(conn)?;
            if updated == 0 {
                return Err(StoreError::Conflict(format!(
                    "waiting list {} is missing or no longer at version {expected}",
                    row.id
                )));
            }
            WaitingList::try_from(row)
        })
        .await
    }

    async fn pending_waiting_lists(
        &self,
        prisoner_number: &str,
        prison_code: Option<&str>,
        schedule_id: Option<Uuid>,
    ) -> StoreResult<Vec<WaitingList>> {
        let prisoner_number = prisoner_number.to_string();
        let prison_code = prison_code.map(str::to_string);
        self.with_conn(move |conn| {
            let mut query = waiting_lists::table
                .select(WaitingListRow::as_select())
                .filter(waiting_lists::prisoner_number.eq(prisoner_number))
                .filter(waiting_lists::status.eq(PENDING))
                .order(waiting_lists::application_date.asc())
                .into_boxed();
            if let Some(code) = prison_code {
                query = query.filter(waiting_lists::prison_code.eq(code));
            }
            if let Some(id) = schedule_id {
                query = query.filter(waiting_lists::schedule_id.eq(id));
            }
            let rows: Vec<WaitingListRow> = query.load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn insert_attendance(&self, attendance: &Attendance) -> StoreResult<()> {
        let row = AttendanceRow::from(attendance);
        self.with_conn(move |conn| {
            diesel::insert_into(attendances::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn update_attendance(&self, attendance: &Attendance) -> StoreResult<()> {
        let row = AttendanceRow::from(attendance);
        self.with_conn(move |conn| {
            let updated = diesel::update(attendances::table.find(row.id))
                .set(&row)
                .execute(conn)?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("attendance {}", row.id)));
            }
            Ok(())
        })
        .await
    }

    async fn attendances_for_instance(&self, instance_id: Uuid) -> StoreResult<Vec<Attendance>> {
        self.with_conn(move |conn| {
            let rows: Vec<AttendanceRow> = attendances::table
                .filter(attendances::scheduled_instance_id.eq(instance_id))
                .order(attendances::prisoner_number.asc())
                .select(AttendanceRow::as_select())
                .load(conn)?;
            convert(rows)
        })
        .await
    }

    async fn insert_job_run(&self, run: &JobRun) -> StoreResult<()> {
        let row = JobRunRow::from(run);
        self.with_conn(move |conn| {
            diesel::insert_into(job_runs::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn job_run(&self, id: Uuid) -> StoreResult<Option<JobRun>> {
        self.with_conn(move |conn| {
            let row: Option<JobRunRow> = job_runs::table
                .find(id)
                .select(JobRunRow::as_select())
                .first(conn)
                .optional()?;
            row.map(JobRun::try_from).transpose()
        })
        .await
    }

    async fn record_subtask(
        &self,
        run_id: Uuid,
        prison_code: &str,
        outcome: &SubtaskOutcome,
        at: NaiveDateTime,
    ) -> StoreResult<JobRun> {
        let subtask = NewJobSubtask {
            job_run_id: run_id,
            prison_code: prison_code.to_string(),
            succeeded: *outcome == SubtaskOutcome::Succeeded,
            error: match outcome {
                SubtaskOutcome::Failed(message) => Some(message.clone()),
                SubtaskOutcome::Succeeded => None,
            },
            recorded_at: at,
        };
        self.with_conn(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let exists: Option<Uuid> = job_runs::table
                    .find(run_id)
                    .select(job_runs::id)
                    .first(conn)
                    .optional()?;
                if exists.is_none() {
                    return Err(StoreError::NotFound(format!("job run {run_id}")));
                }

                let inserted = diesel::insert_into(job_subtasks::table)
                    .values(&subtask)
                    .on_conflict_do_nothing()
                    .execute(conn)?;
                if inserted == 1 {
                    let target = job_runs::table.find(run_id);
                    match &subtask.error {
                        None => diesel::update(target)
                            .set(job_runs::completed_subtasks.eq(job_runs::completed_subtasks + 1))
                            .execute(conn)?,
                        Some(message) => diesel::update(target)
                            .set((
                                job_runs::failed_subtasks.eq(job_runs::failed_subtasks + 1),
                                job_runs::last_error.eq(Some(message.clone())),
                            ))
                            .execute(conn)?,
                    };
                }

                let row: JobRunRow = job_runs::table
                    .find(run_id)
                    .select(JobRunRow::as_select())
                    .for_update()
                    .first(conn)?;
                let mut run = JobRun::try_from(row)?;
                if run.successful.is_none() {
                    run.settle(at);
                    if run.successful.is_some() {
                        diesel::update(job_runs::table.find(run_id))
                            .set((
                                job_runs::successful.eq(run.successful),
                                job_runs::finished_at.eq(run.finished_at),
                            ))
                            .execute(conn)?;
                    }
                }
                Ok(run)
            })
        })
        .await
    }
}
