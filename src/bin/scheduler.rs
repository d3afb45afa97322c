use std::{sync::Arc, time::Duration};

use tokio::signal;
use tracing_subscriber::EnvFilter;

use activities::{
    config::AppConfig, db, state::AppState, store::PgStore, JobOrchestrator, Scheduler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "scheduler",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        interval_secs = config.scheduling.scheduler_interval_secs,
        concurrency = config.scheduling.job_concurrency,
        "loaded activities configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    db::run_migrations(&pool)?;

    let interval = Duration::from_secs(config.scheduling.scheduler_interval_secs.max(1));
    let state = AppState::from_config(Arc::new(PgStore::new(pool)), config)?;
    let scheduler = Scheduler::new(JobOrchestrator::new(state), interval);

    tokio::select! {
        _ = scheduler.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("scheduler received shutdown signal");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
