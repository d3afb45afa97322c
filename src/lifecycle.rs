//! Allocation lifecycle: the date-driven pass run by the jobs and the
//! handling of inbound prisoner movements. Every change to an allocation
//! goes through [`AllocationLifecycle::apply`], which re-reads the row,
//! re-checks the precondition and writes with an optimistic version check.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    allocation::{
        Allocation, AllocationStatus, DeallocationReason, Exclusion, PlannedDeallocation,
        TransitionError,
    },
    clients::{
        prisoner_search::{last_departure, still_away},
        LookupError, PrisonerStatus,
    },
    events::{MovementType, OutboundEvent, PrisonerMovementEvent},
    jobs::JobFlags,
    schedule::Schedule,
    state::AppState,
    store::StoreError,
    waiting_list::{WaitingList, WaitingListError},
};

const MAX_APPLY_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("schedule {0} not found")]
    ScheduleNotFound(Uuid),
    #[error("allocation {0} not found")]
    AllocationNotFound(Uuid),
    #[error("prisoner {0} not found")]
    PrisonerNotFound(String),
    #[error(transparent)]
    Application(#[from] WaitingListError),
    #[error("waiting list application {0} not found")]
    ApplicationNotFound(Uuid),
    #[error("prisoner {prisoner_number} already has a pending application for schedule {schedule_id}")]
    DuplicateApplication {
        schedule_id: Uuid,
        prisoner_number: String,
    },
    #[error("schedule {0} is at capacity")]
    AtCapacity(Uuid),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Activate,
    AutoSuspend,
    Suspend,
    Unsuspend { in_prison: bool },
    End { reason: DeallocationReason, on: NaiveDate },
    Plan(PlannedDeallocation),
}

impl Change {
    fn apply(self, allocation: &mut Allocation) -> Result<(), TransitionError> {
        match self {
            Change::Activate => allocation.activate(),
            Change::AutoSuspend => allocation.auto_suspend(),
            Change::Suspend => allocation.suspend(),
            Change::Unsuspend { in_prison } => allocation.unsuspend(in_prison),
            Change::End { reason, on } => allocation.end(reason, on),
            Change::Plan(planned) => allocation.plan_deallocation(planned),
        }
    }
}

/// Why an allocation is being ended, and what a waiting-list decline should say.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EndTrigger {
    AllocationEndDate,
    ScheduleEnded,
    Planned(DeallocationReason),
    Expired,
    Released,
    Transferred,
}

impl EndTrigger {
    fn reason(self) -> DeallocationReason {
        match self {
            EndTrigger::AllocationEndDate | EndTrigger::ScheduleEnded => DeallocationReason::Ended,
            EndTrigger::Planned(reason) => reason,
            EndTrigger::Expired => DeallocationReason::TemporarilyReleased,
            EndTrigger::Released => DeallocationReason::Released,
            EndTrigger::Transferred => DeallocationReason::Transferred,
        }
    }

    fn decline_reason(self) -> &'static str {
        match self {
            EndTrigger::AllocationEndDate => "Allocation ended",
            EndTrigger::ScheduleEnded => "Activity ended",
            EndTrigger::Planned(reason) => reason.description(),
            EndTrigger::Expired => "Temporarily released or transferred",
            EndTrigger::Released => "Released",
            EndTrigger::Transferred => "Transferred",
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    pub activated: usize,
    pub auto_suspended: usize,
    pub ended: usize,
    pub declined: usize,
    pub failures: Vec<String>,
}

impl LifecycleReport {
    fn record(&mut self, before: AllocationStatus, after: AllocationStatus) {
        match after {
            AllocationStatus::Active if before != AllocationStatus::Active => self.activated += 1,
            AllocationStatus::AutoSuspended if before != AllocationStatus::AutoSuspended => {
                self.auto_suspended += 1
            }
            AllocationStatus::Ended { .. } if !before.is_ended() => self.ended += 1,
            _ => {}
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MovementOutcome {
    pub affected_allocations: usize,
    pub declined_applications: usize,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewAllocation {
    pub schedule_id: Uuid,
    pub prisoner_number: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub pay_band: Option<String>,
    pub exclusions: Vec<Exclusion>,
}

pub struct AllocationLifecycle<'a> {
    state: &'a AppState,
}

impl<'a> AllocationLifecycle<'a> {
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    pub async fn allocate(&self, request: NewAllocation) -> Result<Allocation, LifecycleError> {
        let store = &self.state.store;
        let schedule = store
            .schedule(request.schedule_id)
            .await?
            .ok_or(LifecycleError::ScheduleNotFound(request.schedule_id))?;
        validate_request(&schedule, &request)?;

        let live = store
            .allocations_for_schedule(schedule.id)
            .await?
            .into_iter()
            .filter(|allocation| !allocation.is_ended())
            .count();
        if live >= schedule.capacity as usize {
            return Err(LifecycleError::AtCapacity(schedule.id));
        }

        let today = self.state.clock.today();
        let initial = if request.start_date > today {
            AllocationStatus::Pending
        } else if self
            .require_status(&request.prisoner_number)
            .await?
            .is_in_prison(&schedule.prison_code)
        {
            AllocationStatus::Active
        } else {
            AllocationStatus::AutoSuspended
        };

        let mut allocation = Allocation::new(
            schedule.id,
            schedule.prison_code.clone(),
            request.prisoner_number.clone(),
            request.start_date,
            initial,
        );
        allocation.end_date = request.end_date;
        allocation.pay_band = request.pay_band;
        allocation.exclusions = request.exclusions;

        store.insert_allocation(&allocation).await?;
        self.state
            .publisher
            .publish(OutboundEvent::PrisonerAllocated, allocation.id)
            .await;
        info!(
            allocation_id = %allocation.id,
            schedule_id = %schedule.id,
            prisoner_number = %allocation.prisoner_number,
            status = %allocation.status(),
            "prisoner allocated"
        );

        for mut application in store
            .pending_waiting_lists(
                &allocation.prisoner_number,
                Some(&schedule.prison_code),
                Some(schedule.id),
            )
            .await?
        {
            if application.allocate().is_ok() {
                store.update_waiting_list(&application).await?;
            }
        }

        Ok(allocation)
    }

    pub async fn suspend(&self, allocation_id: Uuid) -> Result<Allocation, LifecycleError> {
        self.apply_required(allocation_id, Change::Suspend).await
    }

    pub async fn unsuspend(&self, allocation_id: Uuid) -> Result<Allocation, LifecycleError> {
        let allocation = self.load(allocation_id).await?;
        let in_prison = self
            .require_status(&allocation.prisoner_number)
            .await?
            .is_in_prison(&allocation.prison_code);
        self.apply_required(allocation_id, Change::Unsuspend { in_prison })
            .await
    }

    /// Ends the allocation now when `date` is today or earlier, otherwise plans it.
    pub async fn deallocate(
        &self,
        allocation_id: Uuid,
        reason: DeallocationReason,
        date: NaiveDate,
    ) -> Result<Allocation, LifecycleError> {
        if !reason.is_planned_choice() {
            return Err(LifecycleError::Invalid(format!(
                "{} cannot be chosen as a deallocation reason",
                reason.as_str()
            )));
        }
        let today = self.state.clock.today();
        if date > today {
            return self
                .apply_required(allocation_id, Change::Plan(PlannedDeallocation { date, reason }))
                .await;
        }

        let ended = self
            .apply_required(allocation_id, Change::End { reason, on: date })
            .await?;
        self.decline_waiting_lists(
            &ended.prisoner_number,
            Some(&ended.prison_code),
            Some(ended.schedule_id),
            EndTrigger::Planned(reason).decline_reason(),
        )
        .await?;
        Ok(ended)
    }

    /// Puts the prisoner on the waiting list for a schedule. One pending
    /// application per prisoner and schedule.
    pub async fn apply_for(
        &self,
        schedule_id: Uuid,
        prisoner_number: &str,
    ) -> Result<WaitingList, LifecycleError> {
        let store = &self.state.store;
        let schedule = store
            .schedule(schedule_id)
            .await?
            .ok_or(LifecycleError::ScheduleNotFound(schedule_id))?;
        let today = self.state.clock.today();
        if schedule.has_ended(today) {
            return Err(LifecycleError::Invalid(format!(
                "schedule {schedule_id} has ended"
            )));
        }
        let pending = store
            .pending_waiting_lists(prisoner_number, Some(&schedule.prison_code), Some(schedule.id))
            .await?;
        if !pending.is_empty() {
            return Err(LifecycleError::DuplicateApplication {
                schedule_id,
                prisoner_number: prisoner_number.to_string(),
            });
        }

        let application =
            WaitingList::new(schedule.id, schedule.prison_code.clone(), prisoner_number, today);
        store.insert_waiting_list(&application).await?;
        info!(
            waiting_list_id = %application.id,
            %schedule_id,
            prisoner_number,
            "waiting list application added"
        );
        Ok(application)
    }

    /// Withdraws a pending application. Only pending applications can be removed.
    pub async fn remove_application(
        &self,
        waiting_list_id: Uuid,
    ) -> Result<WaitingList, LifecycleError> {
        let store = &self.state.store;
        let mut application = store
            .waiting_list(waiting_list_id)
            .await?
            .ok_or(LifecycleError::ApplicationNotFound(waiting_list_id))?;
        application.remove()?;
        let saved = store.update_waiting_list(&application).await?;
        info!(%waiting_list_id, "waiting list application removed");
        Ok(saved)
    }

    /// Advances every live allocation in the prison according to today's date
    /// and the prisoners' whereabouts. Failures are collected per allocation.
    pub async fn run_date_pass(
        &self,
        prison_code: &str,
        flags: JobFlags,
    ) -> Result<LifecycleReport, LifecycleError> {
        let store = &self.state.store;
        let today = self.state.clock.today();
        let schedules: HashMap<Uuid, Schedule> = store
            .schedules_for_prison(prison_code)
            .await?
            .into_iter()
            .map(|schedule| (schedule.id, schedule))
            .collect();
        let allocations = store.live_allocations_for_prison(prison_code).await?;

        let mut report = LifecycleReport::default();
        let mut statuses: HashMap<String, PrisonerStatus> = HashMap::new();
        for allocation in allocations {
            let outcome = self
                .advance(
                    &allocation,
                    schedules.get(&allocation.schedule_id),
                    flags,
                    today,
                    &mut statuses,
                    &mut report,
                )
                .await;
            if let Err(err) = outcome {
                error!(
                    allocation_id = %allocation.id,
                    prison_code,
                    error = %err,
                    "failed to advance allocation"
                );
                report
                    .failures
                    .push(format!("allocation {}: {err}", allocation.id));
            }
        }

        info!(
            prison_code,
            activated = report.activated,
            auto_suspended = report.auto_suspended,
            ended = report.ended,
            declined = report.declined,
            failures = report.failures.len(),
            "allocation date pass finished"
        );
        Ok(report)
    }

    async fn advance(
        &self,
        allocation: &Allocation,
        schedule: Option<&Schedule>,
        flags: JobFlags,
        today: NaiveDate,
        statuses: &mut HashMap<String, PrisonerStatus>,
        report: &mut LifecycleReport,
    ) -> Result<(), LifecycleError> {
        if flags.deallocate {
            if let Some(trigger) = end_trigger(allocation, schedule, today) {
                self.end_and_decline(allocation.id, trigger, today, report)
                    .await?;
                return Ok(());
            }
        }

        let mut current = allocation.clone();
        if flags.activate && current.start_date <= today {
            let location_driven = matches!(
                current.status(),
                AllocationStatus::Pending | AllocationStatus::Active | AllocationStatus::AutoSuspended
            );
            if location_driven {
                let in_prison = self
                    .cached_status(&current.prisoner_number, statuses)
                    .await?
                    .is_in_prison(&current.prison_code);
                let before = current.status();
                let changed = self
                    .apply(current.id, |latest| location_change(latest, in_prison))
                    .await?;
                if let Some(updated) = changed {
                    report.record(before, updated.status());
                    current = updated;
                }
            }
        }

        if flags.deallocate && current.status() == AllocationStatus::AutoSuspended {
            if self.absence_expired(&current, today).await? {
                self.end_and_decline(current.id, EndTrigger::Expired, today, report)
                    .await?;
            }
        }
        Ok(())
    }

    async fn absence_expired(
        &self,
        allocation: &Allocation,
        today: NaiveDate,
    ) -> Result<bool, LifecycleError> {
        let movements = self
            .state
            .prisoners
            .movements(&allocation.prisoner_number, &allocation.prison_code)
            .await?;
        let Some(departure) = last_departure(&movements, &allocation.prison_code) else {
            return Ok(false);
        };
        let expiry = Duration::days(self.state.config.scheduling.allocation_expiry_days);
        Ok(still_away(&movements, &allocation.prison_code, departure)
            && departure.movement_date + expiry <= today)
    }

    async fn end_and_decline(
        &self,
        allocation_id: Uuid,
        trigger: EndTrigger,
        today: NaiveDate,
        report: &mut LifecycleReport,
    ) -> Result<(), LifecycleError> {
        let reason = trigger.reason();
        let ended = self
            .apply(allocation_id, |latest| {
                (!latest.is_ended()).then_some(Change::End { reason, on: today })
            })
            .await?;
        if let Some(ended) = ended {
            report.ended += 1;
            report.declined += self
                .decline_waiting_lists(
                    &ended.prisoner_number,
                    Some(&ended.prison_code),
                    Some(ended.schedule_id),
                    trigger.decline_reason(),
                )
                .await?;
        }
        Ok(())
    }

    /// Applies one inbound movement. Replaying the same event finds nothing
    /// left to change and is a no-op.
    pub async fn handle_movement(
        &self,
        event: &PrisonerMovementEvent,
    ) -> Result<MovementOutcome, LifecycleError> {
        let today = self.state.clock.today();
        let prison_code = event.prison_code.as_deref();
        let allocations = self
            .state
            .store
            .live_allocations_for_prisoner(&event.prisoner_number, prison_code)
            .await?;

        let leaving = match event.movement_type {
            MovementType::Released => Some(EndTrigger::Released),
            MovementType::Transferred => Some(EndTrigger::Transferred),
            MovementType::TemporaryRelease | MovementType::Received => None,
        };

        // A reception that names no prison only reactivates where the
        // prisoner actually is now.
        let whereabouts = match (event.movement_type, prison_code) {
            (MovementType::Received, None) if !allocations.is_empty() => {
                Some(self.require_status(&event.prisoner_number).await?)
            }
            _ => None,
        };

        let mut outcome = MovementOutcome::default();
        for allocation in &allocations {
            let result = match (event.movement_type, leaving) {
                (_, Some(trigger)) => {
                    let reason = trigger.reason();
                    self.apply(allocation.id, |latest| {
                        (!latest.is_ended()).then_some(Change::End { reason, on: today })
                    })
                    .await
                }
                (MovementType::TemporaryRelease, None) => {
                    self.apply(allocation.id, |latest| {
                        (latest.status() == AllocationStatus::Active).then_some(Change::AutoSuspend)
                    })
                    .await
                }
                _ => {
                    self.apply(allocation.id, |latest| {
                        let back_here = whereabouts
                            .as_ref()
                            .map_or(true, |status| status.is_in_prison(&latest.prison_code));
                        (back_here && latest.status() == AllocationStatus::AutoSuspended)
                            .then_some(Change::Activate)
                    })
                    .await
                }
            };
            match result {
                Ok(Some(_)) => outcome.affected_allocations += 1,
                Ok(None) => {}
                Err(err) => {
                    error!(
                        allocation_id = %allocation.id,
                        prisoner_number = %event.prisoner_number,
                        error = %err,
                        "failed to apply prisoner movement"
                    );
                    outcome
                        .failures
                        .push(format!("allocation {}: {err}", allocation.id));
                }
            }
        }

        if let Some(trigger) = leaving {
            outcome.declined_applications = self
                .decline_waiting_lists(
                    &event.prisoner_number,
                    prison_code,
                    None,
                    trigger.decline_reason(),
                )
                .await?;
        }

        info!(
            prisoner_number = %event.prisoner_number,
            movement_type = ?event.movement_type,
            affected = outcome.affected_allocations,
            declined = outcome.declined_applications,
            "processed prisoner movement"
        );
        Ok(outcome)
    }

    async fn load(&self, allocation_id: Uuid) -> Result<Allocation, LifecycleError> {
        self.state
            .store
            .allocation(allocation_id)
            .await?
            .ok_or(LifecycleError::AllocationNotFound(allocation_id))
    }

    async fn require_status(&self, prisoner_number: &str) -> Result<PrisonerStatus, LifecycleError> {
        self.state
            .prisoners
            .prisoner_status(prisoner_number)
            .await?
            .ok_or_else(|| LifecycleError::PrisonerNotFound(prisoner_number.to_string()))
    }

    async fn cached_status(
        &self,
        prisoner_number: &str,
        cache: &mut HashMap<String, PrisonerStatus>,
    ) -> Result<PrisonerStatus, LifecycleError> {
        if let Some(status) = cache.get(prisoner_number) {
            return Ok(status.clone());
        }
        let status = self.require_status(prisoner_number).await?;
        cache.insert(prisoner_number.to_string(), status.clone());
        Ok(status)
    }

    /// Like [`Self::apply`] for an explicit request: an inapplicable change is an error.
    async fn apply_required(
        &self,
        allocation_id: Uuid,
        change: Change,
    ) -> Result<Allocation, LifecycleError> {
        self.apply(allocation_id, |_| Some(change))
            .await?
            .ok_or(LifecycleError::AllocationNotFound(allocation_id))
    }

    /// Reads the allocation, asks `decide` for a change, applies it and saves
    /// it against the version that was read. A stale write is retried from a
    /// fresh read so the decision is always made on current state. Returns
    /// `None` when `decide` finds nothing to do.
    async fn apply<F>(
        &self,
        allocation_id: Uuid,
        decide: F,
    ) -> Result<Option<Allocation>, LifecycleError>
    where
        F: Fn(&Allocation) -> Option<Change> + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            let mut current = self.load(allocation_id).await?;
            let Some(change) = decide(&current) else {
                return Ok(None);
            };
            let before = current.status();
            change.apply(&mut current)?;

            match self.state.store.update_allocation(&current).await {
                Ok(saved) => {
                    debug!(
                        %allocation_id,
                        from = %before,
                        to = %saved.status(),
                        "allocation updated"
                    );
                    // A planned deallocation leaves the status alone and is not announced.
                    if saved.status() != before {
                        self.state
                            .publisher
                            .publish(OutboundEvent::AllocationAmended, saved.id)
                            .await;
                    }
                    return Ok(Some(saved));
                }
                Err(StoreError::Conflict(message)) if attempt < MAX_APPLY_ATTEMPTS => {
                    warn!(%allocation_id, attempt, %message, "allocation changed concurrently; re-reading");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn decline_waiting_lists(
        &self,
        prisoner_number: &str,
        prison_code: Option<&str>,
        schedule_id: Option<Uuid>,
        reason: &str,
    ) -> Result<usize, LifecycleError> {
        let store = &self.state.store;
        let mut declined = 0;
        for mut application in store
            .pending_waiting_lists(prisoner_number, prison_code, schedule_id)
            .await?
        {
            if application.decline(reason).is_err() {
                continue;
            }
            match store.update_waiting_list(&application).await {
                Ok(_) => declined += 1,
                Err(StoreError::Conflict(_)) => {
                    debug!(waiting_list_id = %application.id, "waiting list changed concurrently");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(declined)
    }
}

fn validate_request(schedule: &Schedule, request: &NewAllocation) -> Result<(), LifecycleError> {
    if request.start_date < schedule.start_date {
        return Err(LifecycleError::Invalid(format!(
            "allocation start {} is before the schedule starts on {}",
            request.start_date, schedule.start_date
        )));
    }
    if let Some(end) = schedule.end_date {
        if request.start_date > end {
            return Err(LifecycleError::Invalid(format!(
                "allocation start {} is after the schedule ends on {end}",
                request.start_date
            )));
        }
    }
    if let Some(end) = request.end_date {
        if end < request.start_date {
            return Err(LifecycleError::Invalid(format!(
                "allocation end {end} is before its start {}",
                request.start_date
            )));
        }
    }
    if let Some(exclusion) = request
        .exclusions
        .iter()
        .find(|exclusion| exclusion.week_number < 1 || exclusion.week_number > schedule.schedule_weeks)
    {
        return Err(LifecycleError::Invalid(format!(
            "exclusion week {} is outside the {} week rotation",
            exclusion.week_number, schedule.schedule_weeks
        )));
    }
    Ok(())
}

fn end_trigger(
    allocation: &Allocation,
    schedule: Option<&Schedule>,
    today: NaiveDate,
) -> Option<EndTrigger> {
    if let Some(planned) = allocation.planned_deallocation() {
        if planned.date <= today {
            return Some(EndTrigger::Planned(planned.reason));
        }
    }
    if allocation.end_date.is_some_and(|end| end <= today) {
        return Some(EndTrigger::AllocationEndDate);
    }
    if schedule.is_some_and(|schedule| schedule.has_ended(today)) {
        return Some(EndTrigger::ScheduleEnded);
    }
    None
}

fn location_change(allocation: &Allocation, in_prison: bool) -> Option<Change> {
    match (allocation.status(), in_prison) {
        (AllocationStatus::Pending, true) | (AllocationStatus::AutoSuspended, true) => {
            Some(Change::Activate)
        }
        (AllocationStatus::Pending, false) | (AllocationStatus::Active, false) => {
            Some(Change::AutoSuspend)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn allocation(status: AllocationStatus) -> Allocation {
        Allocation::new(Uuid::new_v4(), "RSI", "A1234BC", today(), status)
    }

    #[test]
    fn location_drives_pending_and_suspension() {
        assert_eq!(
            location_change(&allocation(AllocationStatus::Pending), false),
            Some(Change::AutoSuspend)
        );
        assert_eq!(
            location_change(&allocation(AllocationStatus::Pending), true),
            Some(Change::Activate)
        );
        assert_eq!(
            location_change(&allocation(AllocationStatus::Active), true),
            None
        );
        assert_eq!(
            location_change(&allocation(AllocationStatus::AutoSuspended), false),
            None
        );
        assert_eq!(
            location_change(&allocation(AllocationStatus::Suspended), true),
            None
        );
    }

    #[test]
    fn planned_deallocation_wins_over_end_date() {
        let mut a = allocation(AllocationStatus::Active);
        a.end_date = Some(today());
        a.plan_deallocation(PlannedDeallocation {
            date: today(),
            reason: DeallocationReason::Health,
        })
        .unwrap();
        assert_eq!(
            end_trigger(&a, None, today()),
            Some(EndTrigger::Planned(DeallocationReason::Health))
        );
    }

    #[test]
    fn end_date_today_ends_allocation() {
        let mut a = allocation(AllocationStatus::Active);
        a.end_date = Some(today());
        assert_eq!(end_trigger(&a, None, today()), Some(EndTrigger::AllocationEndDate));
        a.end_date = Some(today().succ_opt().unwrap());
        assert_eq!(end_trigger(&a, None, today()), None);
    }

    #[test]
    fn decline_reasons_name_the_trigger() {
        assert_eq!(EndTrigger::Released.decline_reason(), "Released");
        assert_eq!(EndTrigger::ScheduleEnded.decline_reason(), "Activity ended");
        assert_eq!(EndTrigger::Expired.reason(), DeallocationReason::TemporarilyReleased);
    }
}
