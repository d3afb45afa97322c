use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::clients::RetryPolicy;
use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_BANK_HOLIDAYS_URL: &str = "https://www.gov.uk/bank-holidays.json";

#[derive(Clone, Debug)]
pub struct SchedulingConfig {
    pub days_in_advance: i64,
    pub job_concurrency: usize,
    pub allocation_expiry_days: i64,
    pub lookup_max_attempts: u32,
    pub lookup_backoff_ms: u64,
    pub scheduler_interval_secs: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            days_in_advance: 60,
            job_concurrency: 4,
            allocation_expiry_days: 5,
            lookup_max_attempts: 3,
            lookup_backoff_ms: 200,
            scheduler_interval_secs: 3600,
        }
    }
}

impl SchedulingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.lookup_max_attempts.max(1),
            base_delay: Duration::from_millis(self.lookup_backoff_ms),
        }
    }

    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            days_in_advance: parse_or("SCHEDULE_DAYS_IN_ADVANCE", defaults.days_in_advance)?,
            job_concurrency: parse_or("JOB_CONCURRENCY", defaults.job_concurrency)?.max(1),
            allocation_expiry_days: parse_or(
                "ALLOCATION_EXPIRY_DAYS",
                defaults.allocation_expiry_days,
            )?,
            lookup_max_attempts: parse_or("LOOKUP_MAX_ATTEMPTS", defaults.lookup_max_attempts)?,
            lookup_backoff_ms: parse_or("LOOKUP_BACKOFF_MS", defaults.lookup_backoff_ms)?,
            scheduler_interval_secs: parse_or(
                "SCHEDULER_INTERVAL_SECS",
                defaults.scheduler_interval_secs,
            )?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub prisoner_search_url: String,
    pub prison_api_url: String,
    pub bank_holidays_url: String,
    pub bank_holiday_division: String,
    pub events_webhook_url: Option<String>,
    pub scheduling: SchedulingConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let prisoner_search_url =
            env::var("PRISONER_SEARCH_URL").context("PRISONER_SEARCH_URL must be set")?;
        let prison_api_url = env::var("PRISON_API_URL").context("PRISON_API_URL must be set")?;
        let bank_holidays_url = env::var("BANK_HOLIDAYS_URL")
            .unwrap_or_else(|_| DEFAULT_BANK_HOLIDAYS_URL.to_string());
        let bank_holiday_division = env::var("BANK_HOLIDAY_DIVISION")
            .unwrap_or_else(|_| "england-and-wales".to_string());
        let events_webhook_url = env::var("EVENTS_WEBHOOK_URL").ok();
        let scheduling = SchedulingConfig::from_env()?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            prisoner_search_url,
            prison_api_url,
            bank_holidays_url,
            bank_holiday_division,
            events_webhook_url,
            scheduling,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{name} must be a valid number, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
