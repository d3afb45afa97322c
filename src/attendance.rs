use std::collections::HashSet;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    allocation::{Allocation, AllocationStatus},
    events::OutboundEvent,
    schedule::{Schedule, ScheduledInstance},
    state::AppState,
    store::StoreResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceReason {
    Attended,
    Cancelled,
    Sick,
    Refused,
    NotRequired,
    Rest,
    Other,
}

impl AttendanceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceReason::Attended => "ATTENDED",
            AttendanceReason::Cancelled => "CANCELLED",
            AttendanceReason::Sick => "SICK",
            AttendanceReason::Refused => "REFUSED",
            AttendanceReason::NotRequired => "NOT_REQUIRED",
            AttendanceReason::Rest => "REST",
            AttendanceReason::Other => "OTHER",
        }
    }
}

impl FromStr for AttendanceReason {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ATTENDED" => Ok(AttendanceReason::Attended),
            "CANCELLED" => Ok(AttendanceReason::Cancelled),
            "SICK" => Ok(AttendanceReason::Sick),
            "REFUSED" => Ok(AttendanceReason::Refused),
            "NOT_REQUIRED" => Ok(AttendanceReason::NotRequired),
            "REST" => Ok(AttendanceReason::Rest),
            "OTHER" => Ok(AttendanceReason::Other),
            other => Err(format!("unknown attendance reason {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    Waiting,
    Completed {
        reason: AttendanceReason,
        issue_payment: bool,
    },
}

impl AttendanceStatus {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceStatus::Waiting => "WAITING",
            AttendanceStatus::Completed { .. } => "COMPLETED",
        }
    }

    pub fn from_parts(
        code: &str,
        reason: Option<&str>,
        issue_payment: Option<bool>,
    ) -> Result<Self, String> {
        match code {
            "WAITING" => Ok(AttendanceStatus::Waiting),
            "COMPLETED" => Ok(AttendanceStatus::Completed {
                reason: reason
                    .ok_or_else(|| "completed attendance without a reason".to_string())?
                    .parse()?,
                issue_payment: issue_payment.unwrap_or(false),
            }),
            other => Err(format!("unknown attendance status {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("attendance {0} has already been recorded")]
pub struct AlreadyRecorded(pub Uuid);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attendance {
    pub id: Uuid,
    pub scheduled_instance_id: Uuid,
    pub prisoner_number: String,
    #[serde(flatten)]
    pub(crate) status: AttendanceStatus,
    /// Pence, fixed at generation time.
    pub pay_amount: Option<i32>,
    pub recorded_at: Option<NaiveDateTime>,
}

impl Attendance {
    /// A cancelled session is recorded up front and paid.
    pub fn for_instance(
        instance: &ScheduledInstance,
        prisoner_number: &str,
        pay_amount: Option<i32>,
        now: NaiveDateTime,
    ) -> Self {
        let (status, recorded_at) = if instance.is_cancelled() {
            (
                AttendanceStatus::Completed {
                    reason: AttendanceReason::Cancelled,
                    issue_payment: true,
                },
                Some(now),
            )
        } else {
            (AttendanceStatus::Waiting, None)
        };
        Self {
            id: Uuid::new_v4(),
            scheduled_instance_id: instance.id,
            prisoner_number: prisoner_number.to_string(),
            status,
            pay_amount,
            recorded_at,
        }
    }

    pub fn status(&self) -> AttendanceStatus {
        self.status
    }

    pub fn record(
        &mut self,
        reason: AttendanceReason,
        issue_payment: bool,
        at: NaiveDateTime,
    ) -> Result<(), AlreadyRecorded> {
        if self.status != AttendanceStatus::Waiting {
            return Err(AlreadyRecorded(self.id));
        }
        self.status = AttendanceStatus::Completed {
            reason,
            issue_payment,
        };
        self.recorded_at = Some(at);
        Ok(())
    }

    /// Returns an attendance completed by a session cancellation to waiting.
    /// Any other recorded outcome is kept.
    pub(crate) fn reopen_cancelled(&mut self) -> bool {
        match self.status {
            AttendanceStatus::Completed {
                reason: AttendanceReason::Cancelled,
                ..
            } => {
                self.status = AttendanceStatus::Waiting;
                self.recorded_at = None;
                true
            }
            _ => false,
        }
    }
}

pub struct AttendanceGenerator<'a> {
    state: &'a AppState,
}

impl<'a> AttendanceGenerator<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Creates the missing attendance rows for `instance`; rows that already
    /// exist are left alone, so repeated calls create nothing new.
    pub async fn generate(
        &self,
        schedule: &Schedule,
        instance: &ScheduledInstance,
    ) -> StoreResult<Vec<Attendance>> {
        let store = &self.state.store;
        let now = self.state.clock.now();
        if instance.session_date > now.date() {
            debug!(instance_id = %instance.id, "instance is in the future; no attendance yet");
            return Ok(Vec::new());
        }

        let existing: HashSet<String> = store
            .attendances_for_instance(instance.id)
            .await?
            .into_iter()
            .map(|attendance| attendance.prisoner_number)
            .collect();

        let day = instance.session_date.weekday();
        let allocations = store.allocations_for_schedule(schedule.id).await?;
        let eligible = allocations.iter().filter(|allocation| {
            allocation.status() == AllocationStatus::Active
                && allocation.covers(instance.session_date)
                && !allocation.is_excluded(instance.week_number, day, instance.time_slot)
        });

        let mut created = Vec::new();
        for allocation in eligible {
            if existing.contains(&allocation.prisoner_number) {
                continue;
            }
            let attendance = Attendance::for_instance(
                instance,
                &allocation.prisoner_number,
                pay_for(schedule, allocation),
                now,
            );
            match store.insert_attendance(&attendance).await {
                Ok(()) => {
                    self.state
                        .publisher
                        .publish(OutboundEvent::AttendanceCreated, attendance.id)
                        .await;
                    created.push(attendance);
                }
                Err(err) if err.is_conflict() => {
                    debug!(
                        instance_id = %instance.id,
                        prisoner_number = %allocation.prisoner_number,
                        "attendance already created concurrently"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(created)
    }
}

fn pay_for(schedule: &Schedule, allocation: &Allocation) -> Option<i32> {
    if !schedule.paid {
        return None;
    }
    let band = allocation.pay_band.as_deref()?;
    let rate = schedule.rate_for(band);
    if rate.is_none() {
        warn!(
            schedule_id = %schedule.id,
            allocation_id = %allocation.id,
            pay_band = band,
            "paid schedule has no rate for pay band"
        );
    }
    rate
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::regime::TimeSlot;

    fn instance(cancelled: bool) -> ScheduledInstance {
        ScheduledInstance {
            id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            session_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            week_number: 1,
            time_slot: TimeSlot::Am,
            cancelled,
            cancelled_reason: cancelled.then(|| "Staff shortage".to_string()),
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[test]
    fn cancelled_instance_attendance_is_completed_and_paid() {
        let attendance = Attendance::for_instance(&instance(true), "A1234BC", Some(100), now());
        assert_eq!(
            attendance.status(),
            AttendanceStatus::Completed {
                reason: AttendanceReason::Cancelled,
                issue_payment: true
            }
        );
        assert_eq!(attendance.recorded_at, Some(now()));
    }

    #[test]
    fn recording_twice_is_rejected() {
        let mut attendance = Attendance::for_instance(&instance(false), "A1234BC", None, now());
        attendance
            .record(AttendanceReason::Attended, true, now())
            .unwrap();
        assert!(attendance
            .record(AttendanceReason::Sick, false, now())
            .is_err());
    }

    #[test]
    fn only_cancellation_outcomes_are_reopened() {
        let mut cancelled = Attendance::for_instance(&instance(true), "A1234BC", Some(100), now());
        assert!(cancelled.reopen_cancelled());
        assert_eq!(cancelled.status(), AttendanceStatus::Waiting);
        assert_eq!(cancelled.recorded_at, None);

        let mut attended = Attendance::for_instance(&instance(false), "A1234BC", None, now());
        attended
            .record(AttendanceReason::Attended, true, now())
            .unwrap();
        assert!(!attended.reopen_cancelled());
        assert!(!cancelled.reopen_cancelled());
    }
}
