use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitingListStatus {
    Pending,
    Allocated,
    Declined { reason: String },
    Removed,
}

impl WaitingListStatus {
    pub fn code(&self) -> &'static str {
        match self {
            WaitingListStatus::Pending => "PENDING",
            WaitingListStatus::Allocated => "ALLOCATED",
            WaitingListStatus::Declined { .. } => "DECLINED",
            WaitingListStatus::Removed => "REMOVED",
        }
    }

    pub fn from_parts(code: &str, declined_reason: Option<String>) -> Result<Self, String> {
        match code {
            "PENDING" => Ok(WaitingListStatus::Pending),
            "ALLOCATED" => Ok(WaitingListStatus::Allocated),
            "DECLINED" => Ok(WaitingListStatus::Declined {
                reason: declined_reason.unwrap_or_default(),
            }),
            "REMOVED" => Ok(WaitingListStatus::Removed),
            other => Err(format!("unknown waiting list status {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("waiting list application {id} is {status}, only PENDING applications can change")]
pub struct WaitingListError {
    pub id: Uuid,
    pub status: &'static str,
}

/// A prisoner's application to join a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitingList {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub prison_code: String,
    pub prisoner_number: String,
    pub application_date: NaiveDate,
    #[serde(flatten)]
    pub(crate) status: WaitingListStatus,
    pub version: i32,
}

impl WaitingList {
    pub fn new(
        schedule_id: Uuid,
        prison_code: impl Into<String>,
        prisoner_number: impl Into<String>,
        application_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            prison_code: prison_code.into(),
            prisoner_number: prisoner_number.into(),
            application_date,
            status: WaitingListStatus::Pending,
            version: 0,
        }
    }

    pub fn status(&self) -> &WaitingListStatus {
        &self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == WaitingListStatus::Pending
    }

    fn close(&mut self, next: WaitingListStatus) -> Result<(), WaitingListError> {
        if !self.is_pending() {
            return Err(WaitingListError {
                id: self.id,
                status: self.status.code(),
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn allocate(&mut self) -> Result<(), WaitingListError> {
        self.close(WaitingListStatus::Allocated)
    }

    pub fn decline(&mut self, reason: impl Into<String>) -> Result<(), WaitingListError> {
        self.close(WaitingListStatus::Declined {
            reason: reason.into(),
        })
    }

    pub fn remove(&mut self) -> Result<(), WaitingListError> {
        self.close(WaitingListStatus::Removed)
    }
}
