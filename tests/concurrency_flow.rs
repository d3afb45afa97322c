mod common;

use std::sync::Arc;

use activities::allocation::{
    Allocation, AllocationStatus, DeallocationReason, PlannedDeallocation,
};
use activities::attendance::Attendance;
use activities::events::{MovementType, OutboundEvent, PrisonerMovementEvent};
use activities::jobs::{JobRun, RolloutPrison, SubtaskOutcome};
use activities::lifecycle::{AllocationLifecycle, NewAllocation};
use activities::regime::{PrisonRegime, TimeSlot};
use activities::schedule::{Schedule, ScheduledInstance};
use activities::store::{ActivityStore, MemoryStore, StoreResult};
use activities::waiting_list::WaitingList;
use activities::JobFlags;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use common::{schedule_with, today, weekday_slot, TestApp, PRISON};
use tokio::sync::Mutex;
use uuid::Uuid;

type Interference = Box<dyn FnOnce(&mut Allocation) + Send>;

/// Lets another writer change the allocation between the lifecycle's read
/// and its first save, so that save lands on a stale version.
struct RacingStore {
    inner: Arc<MemoryStore>,
    interference: Mutex<Option<Interference>>,
}

impl RacingStore {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            interference: Mutex::new(None),
        }
    }

    async fn before_next_save(&self, change: impl FnOnce(&mut Allocation) + Send + 'static) {
        *self.interference.lock().await = Some(Box::new(change));
    }
}

#[async_trait]
impl ActivityStore for RacingStore {
    async fn rollout_prisons(&self) -> StoreResult<Vec<RolloutPrison>> {
        self.inner.rollout_prisons().await
    }

    async fn save_rollout_prison(&self, prison: &RolloutPrison) -> StoreResult<()> {
        self.inner.save_rollout_prison(prison).await
    }

    async fn regimes_for_prison(&self, prison_code: &str) -> StoreResult<Vec<PrisonRegime>> {
        self.inner.regimes_for_prison(prison_code).await
    }

    async fn replace_regime(&self, prison_code: &str, rows: &[PrisonRegime]) -> StoreResult<()> {
        self.inner.replace_regime(prison_code, rows).await
    }

    async fn insert_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        self.inner.insert_schedule(schedule).await
    }

    async fn update_schedule(&self, schedule: &Schedule) -> StoreResult<()> {
        self.inner.update_schedule(schedule).await
    }

    async fn schedule(&self, id: Uuid) -> StoreResult<Option<Schedule>> {
        self.inner.schedule(id).await
    }

    async fn schedules_for_prison(&self, prison_code: &str) -> StoreResult<Vec<Schedule>> {
        self.inner.schedules_for_prison(prison_code).await
    }

    async fn insert_instance(&self, instance: &ScheduledInstance) -> StoreResult<()> {
        self.inner.insert_instance(instance).await
    }

    async fn update_instance(&self, instance: &ScheduledInstance) -> StoreResult<()> {
        self.inner.update_instance(instance).await
    }

    async fn instance(&self, id: Uuid) -> StoreResult<Option<ScheduledInstance>> {
        self.inner.instance(id).await
    }

    async fn instances_for_schedule(
        &self,
        schedule_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<ScheduledInstance>> {
        self.inner.instances_for_schedule(schedule_id, from, to).await
    }

    async fn instances_for_prison_on(
        &self,
        prison_code: &str,
        date: NaiveDate,
    ) -> StoreResult<Vec<ScheduledInstance>> {
        self.inner.instances_for_prison_on(prison_code, date).await
    }

    async fn delete_unattended_instances_after(
        &self,
        schedule_id: Uuid,
        after: NaiveDate,
    ) -> StoreResult<usize> {
        self.inner
            .delete_unattended_instances_after(schedule_id, after)
            .await
    }

    async fn insert_allocation(&self, allocation: &Allocation) -> StoreResult<()> {
        self.inner.insert_allocation(allocation).await
    }

    async fn allocation(&self, id: Uuid) -> StoreResult<Option<Allocation>> {
        self.inner.allocation(id).await
    }

    async fn update_allocation(&self, allocation: &Allocation) -> StoreResult<Allocation> {
        let interference = self.interference.lock().await.take();
        if let Some(change) = interference {
            if let Some(mut current) = self.inner.allocation(allocation.id).await? {
                change(&mut current);
                self.inner.update_allocation(&current).await?;
            }
        }
        self.inner.update_allocation(allocation).await
    }

    async fn allocations_for_schedule(&self, schedule_id: Uuid) -> StoreResult<Vec<Allocation>> {
        self.inner.allocations_for_schedule(schedule_id).await
    }

    async fn live_allocations_for_prison(&self, prison_code: &str) -> StoreResult<Vec<Allocation>> {
        self.inner.live_allocations_for_prison(prison_code).await
    }

    async fn live_allocations_for_prisoner(
        &self,
        prisoner_number: &str,
        prison_code: Option<&str>,
    ) -> StoreResult<Vec<Allocation>> {
        self.inner
            .live_allocations_for_prisoner(prisoner_number, prison_code)
            .await
    }

    async fn insert_waiting_list(&self, application: &WaitingList) -> StoreResult<()> {
        self.inner.insert_waiting_list(application).await
    }

    async fn waiting_list(&self, id: Uuid) -> StoreResult<Option<WaitingList>> {
        self.inner.waiting_list(id).await
    }

    async fn update_waiting_list(&self, application: &WaitingList) -> StoreResult<WaitingList> {
        self.inner.update_waiting_list(application).await
    }

    async fn pending_waiting_lists(
        &self,
        prisoner_number: &str,
        prison_code: Option<&str>,
        schedule_id: Option<Uuid>,
    ) -> StoreResult<Vec<WaitingList>> {
        self.inner
            .pending_waiting_lists(prisoner_number, prison_code, schedule_id)
            .await
    }

    async fn insert_attendance(&self, attendance: &Attendance) -> StoreResult<()> {
        self.inner.insert_attendance(attendance).await
    }

    async fn update_attendance(&self, attendance: &Attendance) -> StoreResult<()> {
        self.inner.update_attendance(attendance).await
    }

    async fn attendances_for_instance(&self, instance_id: Uuid) -> StoreResult<Vec<Attendance>> {
        self.inner.attendances_for_instance(instance_id).await
    }

    async fn insert_job_run(&self, run: &JobRun) -> StoreResult<()> {
        self.inner.insert_job_run(run).await
    }

    async fn job_run(&self, id: Uuid) -> StoreResult<Option<JobRun>> {
        self.inner.job_run(id).await
    }

    async fn record_subtask(
        &self,
        run_id: Uuid,
        prison_code: &str,
        outcome: &SubtaskOutcome,
        at: NaiveDateTime,
    ) -> StoreResult<JobRun> {
        self.inner
            .record_subtask(run_id, prison_code, outcome, at)
            .await
    }
}

async fn racing_app() -> Result<(TestApp, Arc<RacingStore>, Schedule)> {
    let mut racing = None;
    let app = TestApp::with_store(|inner| {
        let store = Arc::new(RacingStore::new(inner));
        racing = Some(store.clone());
        store
    })
    .await?;
    let racing = racing.context("store was wrapped")?;
    let schedule = schedule_with(vec![weekday_slot(TimeSlot::Am)]);
    app.add_schedule(&schedule).await?;
    Ok((app, racing, schedule))
}

fn request(schedule: &Schedule, prisoner_number: &str, start_date: NaiveDate) -> NewAllocation {
    NewAllocation {
        schedule_id: schedule.id,
        prisoner_number: prisoner_number.to_string(),
        start_date,
        end_date: None,
        pay_band: Some("A".to_string()),
        exclusions: Vec::new(),
    }
}

async fn reload(app: &TestApp, allocation: &Allocation) -> Result<Allocation> {
    app.store
        .allocation(allocation.id)
        .await?
        .context("allocation disappeared")
}

#[tokio::test]
async fn concurrent_write_is_retried_on_fresh_state() -> Result<()> {
    let (app, racing, schedule) = racing_app().await?;
    let lifecycle = AllocationLifecycle::new(&app.state);
    let tomorrow = today() + Duration::days(1);
    let allocation = lifecycle
        .allocate(request(&schedule, "A1234BC", tomorrow))
        .await?;

    let leaving = today() + Duration::days(10);
    racing
        .before_next_save(move |current| {
            current
                .plan_deallocation(PlannedDeallocation {
                    date: leaving,
                    reason: DeallocationReason::Health,
                })
                .expect("pending allocations can be planned");
        })
        .await;

    app.clock.set_today(tomorrow);
    app.prisoners.set_in("A1234BC", PRISON).await;
    let report = lifecycle.run_date_pass(PRISON, JobFlags::default()).await?;
    assert_eq!(report.activated, 1);
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    let saved = reload(&app, &allocation).await?;
    assert_eq!(saved.status(), AllocationStatus::Active);
    // The other writer's change survives the retry.
    assert_eq!(saved.planned_deallocation().map(|planned| planned.date), Some(leaving));
    assert_eq!(saved.version, allocation.version + 2);
    assert_eq!(
        app.publisher
            .count(OutboundEvent::AllocationAmended, allocation.id)
            .await,
        1
    );
    Ok(())
}

#[tokio::test]
async fn change_that_no_longer_applies_after_a_conflict_is_dropped() -> Result<()> {
    let (app, racing, schedule) = racing_app().await?;
    app.prisoners.set_in("A1234BC", PRISON).await;
    let lifecycle = AllocationLifecycle::new(&app.state);
    let allocation = lifecycle
        .allocate(request(&schedule, "A1234BC", today()))
        .await?;
    assert_eq!(allocation.status(), AllocationStatus::Active);

    // Staff suspend the allocation while the temporary release is being applied.
    racing
        .before_next_save(|current| {
            current.suspend().expect("active allocations can be suspended");
        })
        .await;
    let outcome = lifecycle
        .handle_movement(&PrisonerMovementEvent {
            prisoner_number: "A1234BC".to_string(),
            prison_code: Some(PRISON.to_string()),
            movement_type: MovementType::TemporaryRelease,
        })
        .await?;
    assert_eq!(outcome.affected_allocations, 0);
    assert!(outcome.failures.is_empty());

    assert_eq!(
        reload(&app, &allocation).await?.status(),
        AllocationStatus::Suspended
    );
    assert_eq!(
        app.publisher
            .count(OutboundEvent::AllocationAmended, allocation.id)
            .await,
        0
    );
    Ok(())
}
