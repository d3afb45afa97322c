use std::collections::HashSet;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    clients::LookupError,
    regime::{RegimeError, RegimeRegistry, TimeSlot},
    resolver::resolve,
    schedule::{Schedule, ScheduledInstance},
    state::AppState,
    store::StoreError,
};

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Regime(#[from] RegimeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Writes scheduled instances for the forward window of a schedule.
pub struct InstanceMaterializer<'a> {
    state: &'a AppState,
    regime: &'a RegimeRegistry,
}

impl<'a> InstanceMaterializer<'a> {
    pub fn new(state: &'a AppState, regime: &'a RegimeRegistry) -> Self {
        Self { state, regime }
    }

    /// Creates the instances missing between `from` and `to` inclusive and
    /// returns how many were created. Dates before today are never touched.
    pub async fn materialize(
        &self,
        schedule: &Schedule,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<usize, MaterializeError> {
        let store = &self.state.store;
        let from = from.max(self.state.clock.today());
        if from > to {
            return Ok(0);
        }

        let mut existing: HashSet<(NaiveDate, TimeSlot)> = store
            .instances_for_schedule(schedule.id, from, to)
            .await?
            .into_iter()
            .map(|instance| (instance.session_date, instance.time_slot))
            .collect();

        let mut created = 0;
        for date in from.iter_days().take_while(|date| *date <= to) {
            let sessions = resolve(schedule, date, self.regime)?;
            if sessions.is_empty() {
                continue;
            }
            if !schedule.runs_on_bank_holiday
                && self.state.bank_holidays.is_bank_holiday(date).await?
            {
                debug!(schedule_id = %schedule.id, %date, "skipping bank holiday");
                continue;
            }

            for session in sessions {
                if !existing.insert((date, session.time_slot)) {
                    continue;
                }
                let instance = ScheduledInstance::new(
                    schedule.id,
                    date,
                    session.start_time,
                    session.end_time,
                    session.week_number,
                    session.time_slot,
                );
                match store.insert_instance(&instance).await {
                    Ok(()) => created += 1,
                    Err(StoreError::Conflict(_)) => {
                        debug!(
                            schedule_id = %schedule.id,
                            %date,
                            time_slot = %session.time_slot,
                            "instance created concurrently"
                        );
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        if created > 0 {
            info!(schedule_id = %schedule.id, created, %from, %to, "materialized scheduled instances");
        }
        Ok(created)
    }

    /// Drops instances after today that nobody has attendance for, so an
    /// edited pattern can be materialized again.
    pub async fn clear_future(&self, schedule: &Schedule) -> Result<usize, MaterializeError> {
        let today = self.state.clock.today();
        let removed = self
            .state
            .store
            .delete_unattended_instances_after(schedule.id, today)
            .await?;
        if removed > 0 {
            info!(schedule_id = %schedule.id, removed, "cleared future scheduled instances");
        }
        Ok(removed)
    }
}
