use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::regime::TimeSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeallocationReason {
    Ended,
    Released,
    TemporarilyReleased,
    Transferred,
    Completed,
    Health,
    Security,
    WithdrawnOwn,
    WithdrawnStaff,
    Dismissed,
    Other,
}

impl DeallocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeallocationReason::Ended => "ENDED",
            DeallocationReason::Released => "RELEASED",
            DeallocationReason::TemporarilyReleased => "TEMPORARILY_RELEASED",
            DeallocationReason::Transferred => "TRANSFERRED",
            DeallocationReason::Completed => "COMPLETED",
            DeallocationReason::Health => "HEALTH",
            DeallocationReason::Security => "SECURITY",
            DeallocationReason::WithdrawnOwn => "WITHDRAWN_OWN",
            DeallocationReason::WithdrawnStaff => "WITHDRAWN_STAFF",
            DeallocationReason::Dismissed => "DISMISSED",
            DeallocationReason::Other => "OTHER",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeallocationReason::Ended => "Allocation end date reached",
            DeallocationReason::Released => "Released from prison",
            DeallocationReason::TemporarilyReleased => "Temporarily released or transferred",
            DeallocationReason::Transferred => "Transferred",
            DeallocationReason::Completed => "Completed course or task",
            DeallocationReason::Health => "Health",
            DeallocationReason::Security => "Security",
            DeallocationReason::WithdrawnOwn => "Withdrawn at their own request",
            DeallocationReason::WithdrawnStaff => "Withdrawn by staff",
            DeallocationReason::Dismissed => "Dismissed",
            DeallocationReason::Other => "Other",
        }
    }

    /// Reasons staff may pick for a planned deallocation; the rest are system driven.
    pub fn is_planned_choice(&self) -> bool {
        !matches!(
            self,
            DeallocationReason::Ended
                | DeallocationReason::Released
                | DeallocationReason::TemporarilyReleased
                | DeallocationReason::Transferred
        )
    }
}

impl FromStr for DeallocationReason {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ENDED" => Ok(DeallocationReason::Ended),
            "RELEASED" => Ok(DeallocationReason::Released),
            "TEMPORARILY_RELEASED" => Ok(DeallocationReason::TemporarilyReleased),
            "TRANSFERRED" => Ok(DeallocationReason::Transferred),
            "COMPLETED" => Ok(DeallocationReason::Completed),
            "HEALTH" => Ok(DeallocationReason::Health),
            "SECURITY" => Ok(DeallocationReason::Security),
            "WITHDRAWN_OWN" => Ok(DeallocationReason::WithdrawnOwn),
            "WITHDRAWN_STAFF" => Ok(DeallocationReason::WithdrawnStaff),
            "DISMISSED" => Ok(DeallocationReason::Dismissed),
            "OTHER" => Ok(DeallocationReason::Other),
            other => Err(format!("unknown deallocation reason {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    Pending,
    Active,
    AutoSuspended,
    Suspended,
    Ended {
        reason: DeallocationReason,
        ended_on: NaiveDate,
    },
}

impl AllocationStatus {
    pub fn code(&self) -> &'static str {
        match self {
            AllocationStatus::Pending => "PENDING",
            AllocationStatus::Active => "ACTIVE",
            AllocationStatus::AutoSuspended => "AUTO_SUSPENDED",
            AllocationStatus::Suspended => "SUSPENDED",
            AllocationStatus::Ended { .. } => "ENDED",
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, AllocationStatus::Ended { .. })
    }

    /// Rebuilds a status from its stored parts.
    pub fn from_parts(
        code: &str,
        reason: Option<&str>,
        ended_on: Option<NaiveDate>,
    ) -> Result<Self, String> {
        match code {
            "PENDING" => Ok(AllocationStatus::Pending),
            "ACTIVE" => Ok(AllocationStatus::Active),
            "AUTO_SUSPENDED" => Ok(AllocationStatus::AutoSuspended),
            "SUSPENDED" => Ok(AllocationStatus::Suspended),
            "ENDED" => {
                let reason = reason
                    .ok_or_else(|| "ended allocation without a reason".to_string())?
                    .parse()?;
                let ended_on =
                    ended_on.ok_or_else(|| "ended allocation without an end date".to_string())?;
                Ok(AllocationStatus::Ended { reason, ended_on })
            }
            other => Err(format!("unknown allocation status {other}")),
        }
    }
}

impl fmt::Display for AllocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedDeallocation {
    pub date: NaiveDate,
    pub reason: DeallocationReason,
}

/// A recurring session the prisoner does not attend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Exclusion {
    pub week_number: i32,
    pub day_of_week: Weekday,
    pub time_slot: TimeSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("allocation {allocation_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub allocation_id: Uuid,
    pub from: &'static str,
    pub to: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub prison_code: String,
    pub prisoner_number: String,
    #[serde(flatten)]
    pub(crate) status: AllocationStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub(crate) planned_deallocation: Option<PlannedDeallocation>,
    pub pay_band: Option<String>,
    pub exclusions: Vec<Exclusion>,
    /// Optimistic lock; bumped by the store on every successful update.
    pub version: i32,
}

impl Allocation {
    pub fn new(
        schedule_id: Uuid,
        prison_code: impl Into<String>,
        prisoner_number: impl Into<String>,
        start_date: NaiveDate,
        initial: AllocationStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            prison_code: prison_code.into(),
            prisoner_number: prisoner_number.into(),
            status: initial,
            start_date,
            end_date: None,
            planned_deallocation: None,
            pay_band: None,
            exclusions: Vec::new(),
            version: 0,
        }
    }

    pub fn status(&self) -> AllocationStatus {
        self.status
    }

    pub fn planned_deallocation(&self) -> Option<PlannedDeallocation> {
        self.planned_deallocation
    }

    pub fn is_ended(&self) -> bool {
        self.status.is_ended()
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date.map_or(true, |end| date <= end)
    }

    pub fn is_excluded(&self, week_number: i32, day_of_week: Weekday, time_slot: TimeSlot) -> bool {
        self.exclusions.iter().any(|exclusion| {
            exclusion.week_number == week_number
                && exclusion.day_of_week == day_of_week
                && exclusion.time_slot == time_slot
        })
    }

    fn reject(&self, to: &'static str) -> TransitionError {
        TransitionError {
            allocation_id: self.id,
            from: self.status.code(),
            to,
        }
    }

    pub fn activate(&mut self) -> Result<(), TransitionError> {
        match self.status {
            AllocationStatus::Pending | AllocationStatus::AutoSuspended => {
                self.status = AllocationStatus::Active;
                Ok(())
            }
            _ => Err(self.reject("ACTIVE")),
        }
    }

    pub fn auto_suspend(&mut self) -> Result<(), TransitionError> {
        match self.status {
            AllocationStatus::Pending | AllocationStatus::Active => {
                self.status = AllocationStatus::AutoSuspended;
                Ok(())
            }
            _ => Err(self.reject("AUTO_SUSPENDED")),
        }
    }

    pub fn suspend(&mut self) -> Result<(), TransitionError> {
        match self.status {
            AllocationStatus::Active => {
                self.status = AllocationStatus::Suspended;
                Ok(())
            }
            _ => Err(self.reject("SUSPENDED")),
        }
    }

    /// Lifts a manual suspension; a prisoner who is currently out lands in AUTO_SUSPENDED.
    pub fn unsuspend(&mut self, in_prison: bool) -> Result<(), TransitionError> {
        match self.status {
            AllocationStatus::Suspended => {
                self.status = if in_prison {
                    AllocationStatus::Active
                } else {
                    AllocationStatus::AutoSuspended
                };
                Ok(())
            }
            _ => Err(self.reject("ACTIVE")),
        }
    }

    pub fn plan_deallocation(&mut self, planned: PlannedDeallocation) -> Result<(), TransitionError> {
        if self.is_ended() {
            return Err(self.reject("PLANNED"));
        }
        self.planned_deallocation = Some(planned);
        Ok(())
    }

    pub fn end(&mut self, reason: DeallocationReason, ended_on: NaiveDate) -> Result<(), TransitionError> {
        if self.is_ended() {
            return Err(self.reject("ENDED"));
        }
        self.status = AllocationStatus::Ended { reason, ended_on };
        self.planned_deallocation = None;
        if self.end_date.map_or(true, |end| end > ended_on) {
            self.end_date = Some(ended_on);
        }
        Ok(())
    }
}
