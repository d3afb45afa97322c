mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use activities::jobs::SubtaskOutcome;
use activities::regime::TimeSlot;
use activities::state::AppState;
use activities::store::ActivityStore;
use activities::workers::{JobExecution, JobHandler};
use activities::{JobFlags, JobOrchestrator, JobType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::http::StatusCode;
use common::{schedule_with, today, weekday_slot, TestApp, PRISON};
use serde_json::{json, Value};

async fn poll_until_finished(app: &TestApp, id: &str) -> Result<Value> {
    for _ in 0..200 {
        let (status, body) = app.get(&format!("/job-runs/{id}")).await?;
        anyhow::ensure!(status == StatusCode::OK, "unexpected status {status}");
        if !body["successful"].is_null() {
            return Ok(body);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("job run {id} never finished")
}

#[tokio::test]
async fn triggered_job_runs_in_the_background() -> Result<()> {
    let app = TestApp::new().await?;
    app.add_schedule(&schedule_with(vec![weekday_slot(TimeSlot::Am)]))
        .await?;

    let (status, body) = app.post_json("/job/daily", &json!({})).await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["job_type"], "daily");
    assert_eq!(body["total_subtasks"], 1);
    let id = body["id"].as_str().context("job run id")?;

    let finished = poll_until_finished(&app, id).await?;
    assert_eq!(finished["successful"], true);
    assert_eq!(finished["completed_subtasks"], 1);
    assert_eq!(finished["failed_subtasks"], 0);
    assert!(!finished["finished_at"].is_null());

    assert_eq!(app.store.instances_for_prison_on(PRISON, today()).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_job_type_is_rejected() -> Result<()> {
    let app = TestApp::new().await?;
    let (status, _) = app.post_json("/job/tidy-up", &json!({})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .get(&format!("/job-runs/{}", uuid::Uuid::new_v4()))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn prison_filter_skips_prisons_without_activities() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app
        .post_json("/job/create-scheduled-instances?prisons=rsi,xyz", &json!({}))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["total_subtasks"], 1);

    // Nothing to do settles the run straight away.
    let (status, body) = app
        .post_json("/job/create-scheduled-instances?prisons=XYZ", &json!({}))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["total_subtasks"], 0);
    assert_eq!(body["successful"], true);
    Ok(())
}

#[tokio::test]
async fn one_failing_prison_fails_the_run_but_not_the_others() -> Result<()> {
    let app = TestApp::new().await?;
    app.enable_prison("MDI").await?;
    let mut elsewhere = schedule_with(vec![weekday_slot(TimeSlot::Am)]);
    elsewhere.prison_code = "MDI".to_string();
    app.add_schedule(&elsewhere).await?;
    app.add_schedule(&schedule_with(vec![weekday_slot(TimeSlot::Am)]))
        .await?;

    let run = JobOrchestrator::new(app.state.clone())
        .run(JobType::Daily, JobFlags::default(), None)
        .await?;
    assert_eq!(run.total_subtasks, 2);
    assert_eq!(run.completed_subtasks, 1);
    assert_eq!(run.failed_subtasks, 1);
    assert_eq!(run.successful, Some(false));
    assert!(run.finished_at.is_some());

    // A late duplicate report is ignored.
    let again = app
        .store
        .record_subtask(run.id, "MDI", &SubtaskOutcome::Succeeded, run.started_at)
        .await?;
    assert_eq!(again.completed_subtasks, 1);
    assert_eq!(again.failed_subtasks, 1);
    assert_eq!(again.successful, Some(false));
    assert_eq!(again.finished_at, run.finished_at);

    assert_eq!(app.store.instances_for_prison_on(PRISON, today()).await?.len(), 1);
    Ok(())
}

struct CountingHandler {
    job_type: JobType,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl JobHandler for CountingHandler {
    fn job_type(&self) -> JobType {
        self.job_type
    }

    async fn handle(&self, _state: &AppState, _prison_code: &str, _flags: JobFlags) -> JobExecution {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            JobExecution::Failed {
                error: "boom".to_string(),
            }
        } else {
            JobExecution::Success
        }
    }
}

#[tokio::test]
async fn daily_job_runs_every_stage_even_after_a_failure() -> Result<()> {
    let app = TestApp::new().await?;
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = |job_type, fail| -> Arc<dyn JobHandler> {
        Arc::new(CountingHandler {
            job_type,
            fail,
            calls: calls.clone(),
        })
    };
    let orchestrator = JobOrchestrator::with_handlers(
        app.state.clone(),
        vec![
            handler(JobType::CreateScheduledInstances, true),
            handler(JobType::CreateAttendanceRecords, false),
            handler(JobType::ManageAllocations, false),
        ],
    );

    let run = orchestrator
        .run(JobType::Daily, JobFlags::default(), None)
        .await?;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(run.successful, Some(false));
    assert_eq!(
        run.last_error.as_deref(),
        Some("RSI: create-scheduled-instances: boom")
    );
    Ok(())
}

#[tokio::test]
async fn health_reports_enabled_prisons() -> Result<()> {
    let app = TestApp::new().await?;
    app.enable_prison("MDI").await?;
    let (status, body) = app.get("/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled_prisons"], 2);
    Ok(())
}
