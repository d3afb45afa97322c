//! Changes to materialized sessions after the jobs have created them:
//! cancelling and restoring a session, and recording attendance.

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::{
    attendance::{AlreadyRecorded, Attendance, AttendanceReason},
    events::OutboundEvent,
    schedule::{InstanceError, ScheduledInstance},
    state::AppState,
    store::StoreError,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Instance(#[from] InstanceError),
    #[error(transparent)]
    Recorded(#[from] AlreadyRecorded),
    #[error("scheduled instance {0} not found")]
    InstanceNotFound(Uuid),
    #[error("no attendance for prisoner {prisoner_number} on scheduled instance {instance_id}")]
    AttendanceNotFound {
        instance_id: Uuid,
        prisoner_number: String,
    },
    #[error("{0}")]
    Invalid(String),
}

pub struct SessionManager<'a> {
    state: &'a AppState,
}

impl<'a> SessionManager<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Cancels a session that has not yet passed. Waiting attendances are
    /// completed as cancelled and paid.
    pub async fn cancel_instance(
        &self,
        instance_id: Uuid,
        reason: &str,
    ) -> Result<ScheduledInstance, SessionError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SessionError::Invalid(
                "a cancellation reason is required".to_string(),
            ));
        }
        let mut instance = self.load_current(instance_id).await?;
        instance.cancel(reason)?;
        self.save_instance(&instance).await?;

        let now = self.state.clock.now();
        let mut completed = 0;
        for mut attendance in self.state.store.attendances_for_instance(instance.id).await? {
            if attendance
                .record(AttendanceReason::Cancelled, true, now)
                .is_ok()
            {
                self.save_attendance(&attendance).await?;
                completed += 1;
            }
        }

        info!(
            %instance_id,
            reason = instance.cancelled_reason().unwrap_or_default(),
            completed,
            "scheduled instance cancelled"
        );
        Ok(instance)
    }

    /// Restores a cancelled session. Attendances completed by the
    /// cancellation go back to waiting; other outcomes are kept.
    pub async fn uncancel_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<ScheduledInstance, SessionError> {
        let mut instance = self.load_current(instance_id).await?;
        let previous_reason = instance.cancelled_reason().unwrap_or_default().to_string();
        instance.uncancel()?;
        self.save_instance(&instance).await?;

        let mut reopened = 0;
        for mut attendance in self.state.store.attendances_for_instance(instance.id).await? {
            if attendance.reopen_cancelled() {
                self.save_attendance(&attendance).await?;
                reopened += 1;
            }
        }

        info!(
            %instance_id,
            %previous_reason,
            reopened,
            "scheduled instance restored"
        );
        Ok(instance)
    }

    pub async fn record_attendance(
        &self,
        instance_id: Uuid,
        prisoner_number: &str,
        reason: AttendanceReason,
        issue_payment: bool,
    ) -> Result<Attendance, SessionError> {
        let instance = self.load(instance_id).await?;
        if instance.session_date > self.state.clock.today() {
            return Err(SessionError::Invalid(format!(
                "session on {} has not happened yet",
                instance.session_date
            )));
        }

        let mut attendance = self
            .state
            .store
            .attendances_for_instance(instance_id)
            .await?
            .into_iter()
            .find(|attendance| attendance.prisoner_number == prisoner_number)
            .ok_or_else(|| SessionError::AttendanceNotFound {
                instance_id,
                prisoner_number: prisoner_number.to_string(),
            })?;
        attendance.record(reason, issue_payment, self.state.clock.now())?;
        self.save_attendance(&attendance).await?;

        info!(
            %instance_id,
            prisoner_number,
            reason = reason.as_str(),
            issue_payment,
            "attendance recorded"
        );
        Ok(attendance)
    }

    pub async fn attendances(&self, instance_id: Uuid) -> Result<Vec<Attendance>, SessionError> {
        self.load(instance_id).await?;
        Ok(self.state.store.attendances_for_instance(instance_id).await?)
    }

    async fn load(&self, instance_id: Uuid) -> Result<ScheduledInstance, SessionError> {
        self.state
            .store
            .instance(instance_id)
            .await?
            .ok_or(SessionError::InstanceNotFound(instance_id))
    }

    /// Past sessions are history and cannot be cancelled or restored.
    async fn load_current(&self, instance_id: Uuid) -> Result<ScheduledInstance, SessionError> {
        let instance = self.load(instance_id).await?;
        if instance.session_date < self.state.clock.today() {
            return Err(SessionError::Invalid(format!(
                "session on {} is in the past",
                instance.session_date
            )));
        }
        Ok(instance)
    }

    async fn save_instance(&self, instance: &ScheduledInstance) -> Result<(), SessionError> {
        self.state.store.update_instance(instance).await?;
        self.state
            .publisher
            .publish(OutboundEvent::ScheduledInstanceAmended, instance.id)
            .await;
        Ok(())
    }

    async fn save_attendance(&self, attendance: &Attendance) -> Result<(), SessionError> {
        self.state.store.update_attendance(attendance).await?;
        self.state
            .publisher
            .publish(OutboundEvent::AttendanceAmended, attendance.id)
            .await;
        Ok(())
    }
}
