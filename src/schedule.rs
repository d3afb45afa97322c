use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::regime::TimeSlot;

/// Set of days of the week a slot runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DayFlags(u8);

impl DayFlags {
    pub fn of(days: &[Weekday]) -> Self {
        days.iter().fold(Self::default(), |flags, day| flags.with(*day))
    }

    pub fn with(self, day: Weekday) -> Self {
        Self(self.0 | 1 << day.num_days_from_monday())
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayRate {
    pub pay_band: String,
    /// Pence per session.
    pub rate: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub id: Uuid,
    pub week_number: i32,
    pub days: DayFlags,
    pub time_slot: TimeSlot,
    pub custom_start: Option<NaiveTime>,
    pub custom_end: Option<NaiveTime>,
    pub updated_at: NaiveDateTime,
}

impl Slot {
    pub fn new(week_number: i32, days: &[Weekday], time_slot: TimeSlot, updated_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            week_number,
            days: DayFlags::of(days),
            time_slot,
            custom_start: None,
            custom_end: None,
            updated_at,
        }
    }

    pub fn with_custom_times(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.custom_start = Some(start);
        self.custom_end = Some(end);
        self
    }

    /// Custom times only count when both ends are set.
    pub fn custom_window(&self) -> Option<(NaiveTime, NaiveTime)> {
        self.custom_start.zip(self.custom_end)
    }

    pub fn runs_on(&self, week_number: i32, day: Weekday) -> bool {
        self.week_number == week_number && self.days.contains(day)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
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
    pub pay_rates: Vec<PayRate>,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("schedule weeks must be at least 1, got {0}")]
    InvalidRotation(i32),
    #[error("slot week {week} is outside the {weeks} week rotation")]
    SlotOutsideRotation { week: i32, weeks: i32 },
    #[error("slot {0} has no days")]
    SlotWithoutDays(Uuid),
    #[error("slot {0} custom start must be before its end")]
    InvalidCustomTimes(Uuid),
    #[error("capacity must be positive")]
    InvalidCapacity,
    #[error("end date {end} is before start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

impl Schedule {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.schedule_weeks < 1 {
            return Err(ScheduleError::InvalidRotation(self.schedule_weeks));
        }
        if self.capacity < 1 {
            return Err(ScheduleError::InvalidCapacity);
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(ScheduleError::EndBeforeStart {
                    start: self.start_date,
                    end,
                });
            }
        }
        for slot in &self.slots {
            if slot.week_number < 1 || slot.week_number > self.schedule_weeks {
                return Err(ScheduleError::SlotOutsideRotation {
                    week: slot.week_number,
                    weeks: self.schedule_weeks,
                });
            }
            if slot.days.is_empty() {
                return Err(ScheduleError::SlotWithoutDays(slot.id));
            }
            if let Some((start, end)) = slot.custom_window() {
                if start >= end {
                    return Err(ScheduleError::InvalidCustomTimes(slot.id));
                }
            }
        }
        Ok(())
    }

    /// False as soon as any slot carries its own times.
    pub fn uses_prison_regime_time(&self) -> bool {
        self.slots.iter().all(|slot| slot.custom_window().is_none())
    }

    pub fn runs_on(&self, date: NaiveDate) -> bool {
        date >= self.start_date && self.end_date.map_or(true, |end| date <= end)
    }

    pub fn has_ended(&self, today: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| end < today)
    }

    pub fn rate_for(&self, pay_band: &str) -> Option<i32> {
        self.pay_rates
            .iter()
            .find(|rate| rate.pay_band == pay_band)
            .map(|rate| rate.rate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error("scheduled instance {0} is already cancelled")]
    AlreadyCancelled(Uuid),
    #[error("scheduled instance {0} is not cancelled")]
    NotCancelled(Uuid),
}

/// One concrete dated session materialized from a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledInstance {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub session_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub week_number: i32,
    pub time_slot: TimeSlot,
    pub(crate) cancelled: bool,
    pub(crate) cancelled_reason: Option<String>,
}

impl ScheduledInstance {
    pub fn new(
        schedule_id: Uuid,
        session_date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        week_number: i32,
        time_slot: TimeSlot,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            session_date,
            start_time,
            end_time,
            week_number,
            time_slot,
            cancelled: false,
            cancelled_reason: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn cancelled_reason(&self) -> Option<&str> {
        self.cancelled_reason.as_deref()
    }

    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), InstanceError> {
        if self.cancelled {
            return Err(InstanceError::AlreadyCancelled(self.id));
        }
        self.cancelled = true;
        self.cancelled_reason = Some(reason.into());
        Ok(())
    }

    pub fn uncancel(&mut self) -> Result<(), InstanceError> {
        if !self.cancelled {
            return Err(InstanceError::NotCancelled(self.id));
        }
        self.cancelled = false;
        self.cancelled_reason = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn schedule(weeks: i32, slots: Vec<Slot>) -> Schedule {
        Schedule {
            id: Uuid::new_v4(),
            activity_id: Uuid::new_v4(),
            prison_code: "RSI".into(),
            description: "Maths level 1".into(),
            capacity: 10,
            runs_on_bank_holiday: false,
            schedule_weeks: weeks,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            paid: true,
            pay_rates: vec![PayRate {
                pay_band: "A".into(),
                rate: 125,
            }],
            slots,
        }
    }

    #[test]
    fn day_flags_track_membership() {
        let flags = DayFlags::of(&[Weekday::Mon, Weekday::Fri]);
        assert!(flags.contains(Weekday::Mon));
        assert!(flags.contains(Weekday::Fri));
        assert!(!flags.contains(Weekday::Sun));
    }

    #[test]
    fn custom_times_disable_regime_time() {
        let slot = Slot::new(1, &[Weekday::Mon], TimeSlot::Am, stamp()).with_custom_times(
            NaiveTime::from_hms_opt(9, 25, 0).unwrap(),
            NaiveTime::from_hms_opt(11, 35, 0).unwrap(),
        );
        assert!(!schedule(1, vec![slot]).uses_prison_regime_time());

        let plain = Slot::new(1, &[Weekday::Mon], TimeSlot::Am, stamp());
        assert!(schedule(1, vec![plain]).uses_prison_regime_time());
    }

    #[test]
    fn rejects_slot_outside_rotation() {
        let slot = Slot::new(3, &[Weekday::Mon], TimeSlot::Am, stamp());
        assert_eq!(
            schedule(2, vec![slot]).validate(),
            Err(ScheduleError::SlotOutsideRotation { week: 3, weeks: 2 })
        );
    }

    #[test]
    fn looks_up_pay_rate_by_band() {
        let schedule = schedule(1, vec![]);
        assert_eq!(schedule.rate_for("A"), Some(125));
        assert_eq!(schedule.rate_for("B"), None);
    }

    #[test]
    fn cancel_is_not_repeatable() {
        let mut instance = ScheduledInstance {
            id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            session_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
            week_number: 1,
            time_slot: TimeSlot::Am,
            cancelled: false,
            cancelled_reason: None,
        };
        instance.cancel("Staff unavailable").unwrap();
        assert!(instance.cancel("again").is_err());
        instance.uncancel().unwrap();
        assert!(!instance.is_cancelled());
    }
}
