//! Diesel rows and their conversions to the domain types. Stored enums are
//! plain strings; a row that does not convert back is reported as
//! [`StoreError::Corrupt`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    allocation::{Allocation, AllocationStatus, Exclusion, PlannedDeallocation},
    attendance::{Attendance, AttendanceStatus},
    jobs::{JobRun, RolloutPrison},
    regime::{weekday_from_number, weekday_number, PrisonRegime, SessionWindow},
    schedule::{DayFlags, PayRate, Schedule, ScheduledInstance, Slot},
    schema::*,
    store::StoreError,
    waiting_list::{WaitingList, WaitingListStatus},
};

fn corrupt(table: &str, id: impl std::fmt::Display, reason: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{table} {id}: {reason}"))
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = rollout_prisons)]
pub struct RolloutPrisonRow {
    pub prison_code: String,
    pub activities_enabled: bool,
    pub appointments_enabled: bool,
}

impl From<RolloutPrisonRow> for RolloutPrison {
    fn from(row: RolloutPrisonRow) -> Self {
        Self {
            prison_code: row.prison_code,
            activities_enabled: row.activities_enabled,
            appointments_enabled: row.appointments_enabled,
        }
    }
}

impl From<&RolloutPrison> for RolloutPrisonRow {
    fn from(prison: &RolloutPrison) -> Self {
        Self {
            prison_code: prison.prison_code.clone(),
            activities_enabled: prison.activities_enabled,
            appointments_enabled: prison.appointments_enabled,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = prison_regimes)]
pub struct PrisonRegimeRow {
    pub prison_code: String,
    pub day_of_week: i32,
    pub am_start: NaiveTime,
    pub am_finish: NaiveTime,
    pub pm_start: NaiveTime,
    pub pm_finish: NaiveTime,
    pub ed_start: NaiveTime,
    pub ed_finish: NaiveTime,
}

impl TryFrom<PrisonRegimeRow> for PrisonRegime {
    type Error = StoreError;

    fn try_from(row: PrisonRegimeRow) -> Result<Self, Self::Error> {
        let day_of_week = weekday_from_number(row.day_of_week)
            .ok_or_else(|| corrupt("prison_regimes", &row.prison_code, "day of week out of range"))?;
        Ok(Self {
            prison_code: row.prison_code,
            day_of_week,
            am: SessionWindow::new(row.am_start, row.am_finish),
            pm: SessionWindow::new(row.pm_start, row.pm_finish),
            ed: SessionWindow::new(row.ed_start, row.ed_finish),
        })
    }
}

impl From<&PrisonRegime> for PrisonRegimeRow {
    fn from(regime: &PrisonRegime) -> Self {
        Self {
            prison_code: regime.prison_code.clone(),
            day_of_week: weekday_number(regime.day_of_week),
            am_start: regime.am.start,
            am_finish: regime.am.finish,
            pm_start: regime.pm.start,
            pm_finish: regime.pm.finish,
            ed_start: regime.ed.start,
            ed_finish: regime.ed.finish,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = schedules)]
#[diesel(treat_none_as_null = true)]
pub struct ScheduleRow {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub prison_code: String,
    pub description: String,
    pub capacity: i32,
    pub runs_on_bank_holiday: bool,
    pub schedule_weeks: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub paid: bool,
    pub pay_rates: serde_json::Value,
}

impl TryFrom<&Schedule> for ScheduleRow {
    type Error = StoreError;

    fn try_from(schedule: &Schedule) -> Result<Self, Self::Error> {
        let pay_rates = serde_json::to_value(&schedule.pay_rates)
            .map_err(|err| corrupt("schedules", schedule.id, err))?;
        Ok(Self {
            id: schedule.id,
            activity_id: schedule.activity_id,
            prison_code: schedule.prison_code.clone(),
            description: schedule.description.clone(),
            capacity: schedule.capacity,
            runs_on_bank_holiday: schedule.runs_on_bank_holiday,
            schedule_weeks: schedule.schedule_weeks,
            start_date: schedule.start_date,
            end_date: schedule.end_date,
            paid: schedule.paid,
            pay_rates,
        })
    }
}

impl ScheduleRow {
    pub fn into_schedule(self, slots: Vec<SlotRow>) -> Result<Schedule, StoreError> {
        let pay_rates: Vec<PayRate> = serde_json::from_value(self.pay_rates)
            .map_err(|err| corrupt("schedules", self.id, err))?;
        let slots = slots
            .into_iter()
            .map(Slot::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Schedule {
            id: self.id,
            activity_id: self.activity_id,
            prison_code: self.prison_code,
            description: self.description,
            capacity: self.capacity,
            runs_on_bank_holiday: self.runs_on_bank_holiday,
            schedule_weeks: self.schedule_weeks,
            start_date: self.start_date,
            end_date: self.end_date,
            paid: self.paid,
            pay_rates,
            slots,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = schedule_slots)]
pub struct SlotRow {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub week_number: i32,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
    pub time_slot: String,
    pub custom_start: Option<NaiveTime>,
    pub custom_end: Option<NaiveTime>,
    pub updated_at: NaiveDateTime,
}

impl SlotRow {
    pub fn from_slot(schedule_id: Uuid, slot: &Slot) -> Self {
        Self {
            id: slot.id,
            schedule_id,
            week_number: slot.week_number,
            monday: slot.days.contains(Weekday::Mon),
            tuesday: slot.days.contains(Weekday::Tue),
            wednesday: slot.days.contains(Weekday::Wed),
            thursday: slot.days.contains(Weekday::Thu),
            friday: slot.days.contains(Weekday::Fri),
            saturday: slot.days.contains(Weekday::Sat),
            sunday: slot.days.contains(Weekday::Sun),
            time_slot: slot.time_slot.as_str().to_string(),
            custom_start: slot.custom_start,
            custom_end: slot.custom_end,
            updated_at: slot.updated_at,
        }
    }
}

impl TryFrom<SlotRow> for Slot {
    type Error = StoreError;

    fn try_from(row: SlotRow) -> Result<Self, Self::Error> {
        let flags = [
            (row.monday, Weekday::Mon),
            (row.tuesday, Weekday::Tue),
            (row.wednesday, Weekday::Wed),
            (row.thursday, Weekday::Thu),
            (row.friday, Weekday::Fri),
            (row.saturday, Weekday::Sat),
            (row.sunday, Weekday::Sun),
        ];
        let days = flags
            .into_iter()
            .filter(|(set, _)| *set)
            .fold(DayFlags::default(), |days, (_, day)| days.with(day));
        Ok(Self {
            id: row.id,
            week_number: row.week_number,
            days,
            time_slot: row
                .time_slot
                .parse()
                .map_err(|err| corrupt("schedule_slots", row.id, err))?,
            custom_start: row.custom_start,
            custom_end: row.custom_end,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = scheduled_instances)]
#[diesel(treat_none_as_null = true)]
pub struct InstanceRow {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub session_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub week_number: i32,
    pub time_slot: String,
    pub cancelled: bool,
    pub cancelled_reason: Option<String>,
}

impl From<&ScheduledInstance> for InstanceRow {
    fn from(instance: &ScheduledInstance) -> Self {
        Self {
            id: instance.id,
            schedule_id: instance.schedule_id,
            session_date: instance.session_date,
            start_time: instance.start_time,
            end_time: instance.end_time,
            week_number: instance.week_number,
            time_slot: instance.time_slot.as_str().to_string(),
            cancelled: instance.cancelled,
            cancelled_reason: instance.cancelled_reason.clone(),
        }
    }
}

impl TryFrom<InstanceRow> for ScheduledInstance {
    type Error = StoreError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            schedule_id: row.schedule_id,
            session_date: row.session_date,
            start_time: row.start_time,
            end_time: row.end_time,
            week_number: row.week_number,
            time_slot: row
                .time_slot
                .parse()
                .map_err(|err| corrupt("scheduled_instances", row.id, err))?,
            cancelled: row.cancelled,
            cancelled_reason: row.cancelled_reason,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = allocations)]
#[diesel(treat_none_as_null = true)]
pub struct AllocationRow {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub prison_code: String,
    pub prisoner_number: String,
    pub status: String,
    pub deallocation_reason: Option<String>,
    pub ended_on: Option<NaiveDate>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub planned_deallocation_date: Option<NaiveDate>,
    pub planned_deallocation_reason: Option<String>,
    pub pay_band: Option<String>,
    pub exclusions: serde_json::Value,
    pub version: i32,
}

impl TryFrom<&Allocation> for AllocationRow {
    type Error = StoreError;

    fn try_from(allocation: &Allocation) -> Result<Self, Self::Error> {
        let (deallocation_reason, ended_on) = match allocation.status {
            AllocationStatus::Ended { reason, ended_on } => {
                (Some(reason.as_str().to_string()), Some(ended_on))
            }
            _ => (None, None),
        };
        let exclusions = serde_json::to_value(&allocation.exclusions)
            .map_err(|err| corrupt("allocations", allocation.id, err))?;
        Ok(Self {
            id: allocation.id,
            schedule_id: allocation.schedule_id,
            prison_code: allocation.prison_code.clone(),
            prisoner_number: allocation.prisoner_number.clone(),
            status: allocation.status.code().to_string(),
            deallocation_reason,
            ended_on,
            start_date: allocation.start_date,
            end_date: allocation.end_date,
            planned_deallocation_date: allocation.planned_deallocation.map(|planned| planned.date),
            planned_deallocation_reason: allocation
                .planned_deallocation
                .map(|planned| planned.reason.as_str().to_string()),
            pay_band: allocation.pay_band.clone(),
            exclusions,
            version: allocation.version,
        })
    }
}

impl TryFrom<AllocationRow> for Allocation {
    type Error = StoreError;

    fn try_from(row: AllocationRow) -> Result<Self, Self::Error> {
        let status = AllocationStatus::from_parts(
            &row.status,
            row.deallocation_reason.as_deref(),
            row.ended_on,
        )
        .map_err(|err| corrupt("allocations", row.id, err))?;
        let planned_deallocation = match (row.planned_deallocation_date, row.planned_deallocation_reason) {
            (Some(date), Some(reason)) => Some(PlannedDeallocation {
                date,
                reason: reason
                    .parse()
                    .map_err(|err| corrupt("allocations", row.id, err))?,
            }),
            _ => None,
        };
        let exclusions: Vec<Exclusion> = serde_json::from_value(row.exclusions)
            .map_err(|err| corrupt("allocations", row.id, err))?;
        Ok(Self {
            id: row.id,
            schedule_id: row.schedule_id,
            prison_code: row.prison_code,
            prisoner_number: row.prisoner_number,
            status,
            start_date: row.start_date,
            end_date: row.end_date,
            planned_deallocation,
            pay_band: row.pay_band,
            exclusions,
            version: row.version,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = waiting_lists)]
#[diesel(treat_none_as_null = true)]
pub struct WaitingListRow {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub prison_code: String,
    pub prisoner_number: String,
    pub application_date: NaiveDate,
    pub status: String,
    pub declined_reason: Option<String>,
    pub version: i32,
}

impl From<&WaitingList> for WaitingListRow {
    fn from(application: &WaitingList) -> Self {
        let declined_reason = match &application.status {
            WaitingListStatus::Declined { reason } => Some(reason.clone()),
            _ => None,
        };
        Self {
            id: application.id,
            schedule_id: application.schedule_id,
            prison_code: application.prison_code.clone(),
            prisoner_number: application.prisoner_number.clone(),
            application_date: application.application_date,
            status: application.status.code().to_string(),
            declined_reason,
            version: application.version,
        }
    }
}

impl TryFrom<WaitingListRow> for WaitingList {
    type Error = StoreError;

    fn try_from(row: WaitingListRow) -> Result<Self, Self::Error> {
        let status = WaitingListStatus::from_parts(&row.status, row.declined_reason)
            .map_err(|err| corrupt("waiting_lists", row.id, err))?;
        Ok(Self {
            id: row.id,
            schedule_id: row.schedule_id,
            prison_code: row.prison_code,
            prisoner_number: row.prisoner_number,
            application_date: row.application_date,
            status,
            version: row.version,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Identifiable)]
#[diesel(table_name = attendances)]
#[diesel(treat_none_as_null = true)]
pub struct AttendanceRow {
    pub id: Uuid,
    pub scheduled_instance_id: Uuid,
    pub prisoner_number: String,
    pub status: String,
    pub attendance_reason: Option<String>,
    pub issue_payment: Option<bool>,
    pub pay_amount: Option<i32>,
    pub recorded_at: Option<NaiveDateTime>,
}

impl From<&Attendance> for AttendanceRow {
    fn from(attendance: &Attendance) -> Self {
        let (attendance_reason, issue_payment) = match attendance.status {
            AttendanceStatus::Completed {
                reason,
                issue_payment,
            } => (Some(reason.as_str().to_string()), Some(issue_payment)),
            AttendanceStatus::Waiting => (None, None),
        };
        Self {
            id: attendance.id,
            scheduled_instance_id: attendance.scheduled_instance_id,
            prisoner_number: attendance.prisoner_number.clone(),
            status: attendance.status.code().to_string(),
            attendance_reason,
            issue_payment,
            pay_amount: attendance.pay_amount,
            recorded_at: attendance.recorded_at,
        }
    }
}

impl TryFrom<AttendanceRow> for Attendance {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        let status = AttendanceStatus::from_parts(
            &row.status,
            row.attendance_reason.as_deref(),
            row.issue_payment,
        )
        .map_err(|err| corrupt("attendances", row.id, err))?;
        Ok(Self {
            id: row.id,
            scheduled_instance_id: row.scheduled_instance_id,
            prisoner_number: row.prisoner_number,
            status,
            pay_amount: row.pay_amount,
            recorded_at: row.recorded_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable)]
#[diesel(table_name = job_runs)]
pub struct JobRunRow {
    pub id: Uuid,
    pub job_type: String,
    pub started_at: NaiveDateTime,
    pub finished_at: Option<NaiveDateTime>,
    pub total_subtasks: i32,
    pub completed_subtasks: i32,
    pub failed_subtasks: i32,
    pub successful: Option<bool>,
    pub last_error: Option<String>,
}

impl From<&JobRun> for JobRunRow {
    fn from(run: &JobRun) -> Self {
        Self {
            id: run.id,
            job_type: run.job_type.as_str().to_string(),
            started_at: run.started_at,
            finished_at: run.finished_at,
            total_subtasks: run.total_subtasks,
            completed_subtasks: run.completed_subtasks,
            failed_subtasks: run.failed_subtasks,
            successful: run.successful,
            last_error: run.last_error.clone(),
        }
    }
}

impl TryFrom<JobRunRow> for JobRun {
    type Error = StoreError;

    fn try_from(row: JobRunRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            job_type: row
                .job_type
                .parse()
                .map_err(|err| corrupt("job_runs", row.id, err))?,
            started_at: row.started_at,
            finished_at: row.finished_at,
            total_subtasks: row.total_subtasks,
            completed_subtasks: row.completed_subtasks,
            failed_subtasks: row.failed_subtasks,
            successful: row.successful,
            last_error: row.last_error,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = job_subtasks)]
pub struct NewJobSubtask {
    pub job_run_id: Uuid,
    pub prison_code: String,
    pub succeeded: bool,
    pub error: Option<String>,
    pub recorded_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::DeallocationReason;
    use crate::regime::TimeSlot;

    #[test]
    fn ended_allocation_survives_a_row_round_trip() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let mut allocation =
            Allocation::new(Uuid::new_v4(), "RSI", "A1234BC", today, AllocationStatus::Active);
        allocation.exclusions.push(Exclusion {
            week_number: 2,
            day_of_week: Weekday::Fri,
            time_slot: TimeSlot::Pm,
        });
        allocation.end(DeallocationReason::Released, today).unwrap();

        let row = AllocationRow::try_from(&allocation).unwrap();
        assert_eq!(row.status, "ENDED");
        assert_eq!(row.deallocation_reason.as_deref(), Some("RELEASED"));
        assert_eq!(Allocation::try_from(row).unwrap(), allocation);
    }

    #[test]
    fn slot_day_columns_map_to_flags() {
        let updated_at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let slot = Slot::new(1, &[Weekday::Mon, Weekday::Thu], TimeSlot::Am, updated_at);
        let row = SlotRow::from_slot(Uuid::new_v4(), &slot);
        assert!(row.monday && row.thursday);
        assert!(!row.tuesday && !row.sunday);
        assert_eq!(Slot::try_from(row).unwrap(), slot);
    }

    #[test]
    fn unknown_status_is_reported_as_corrupt() {
        let row = WaitingListRow {
            id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            prison_code: "RSI".into(),
            prisoner_number: "A1234BC".into(),
            application_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            status: "LOST".into(),
            declined_reason: None,
            version: 0,
        };
        assert!(matches!(
            WaitingList::try_from(row),
            Err(StoreError::Corrupt(_))
        ));
    }
}
