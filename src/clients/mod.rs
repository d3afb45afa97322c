//! Outbound lookups the engine depends on but does not own.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

pub mod bank_holidays;
pub mod prisoner_search;

pub use bank_holidays::{FixedBankHolidays, GovUkBankHolidays};
pub use prisoner_search::PrisonerSearchClient;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("{service} unavailable: {message}")]
    Unavailable { service: &'static str, message: String },
    #[error("{service} returned an unusable response: {message}")]
    BadResponse { service: &'static str, message: String },
}

impl LookupError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LookupError::Unavailable { .. })
    }

    pub(crate) fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        let server_side = err.status().map_or(true, |status| status.is_server_error());
        if (err.is_timeout() || err.is_connect() || err.is_request() || server_side)
            && !err.is_decode()
        {
            LookupError::Unavailable {
                service,
                message: err.to_string(),
            }
        } else {
            LookupError::BadResponse {
                service,
                message: err.to_string(),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InOutStatus {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
    #[serde(rename = "TRN")]
    Transfer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrisonerStatus {
    pub prisoner_number: String,
    pub in_out_status: InOutStatus,
    pub current_prison: Option<String>,
    pub last_movement_type: Option<String>,
    pub release_date: Option<NaiveDate>,
}

impl PrisonerStatus {
    pub fn is_in_prison(&self, prison_code: &str) -> bool {
        self.in_out_status == InOutStatus::In && self.current_prison.as_deref() == Some(prison_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    pub movement_date: NaiveDate,
    pub movement_type: String,
    pub from_prison: Option<String>,
    pub to_prison: Option<String>,
}

#[async_trait]
pub trait PrisonerLookup: Send + Sync + 'static {
    /// `Ok(None)` when the prisoner is unknown.
    async fn prisoner_status(
        &self,
        prisoner_number: &str,
    ) -> Result<Option<PrisonerStatus>, LookupError>;

    async fn movements(
        &self,
        prisoner_number: &str,
        prison_code: &str,
    ) -> Result<Vec<Movement>, LookupError>;
}

#[async_trait]
pub trait BankHolidayCalendar: Send + Sync + 'static {
    async fn is_bank_holiday(&self, date: NaiveDate) -> Result<bool, LookupError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with up to 50% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let jitter_cap = (base.as_millis() / 2) as u64;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        base + Duration::from_millis(jitter)
    }
}

/// Runs `call` until it succeeds, fails permanently, or the attempts run out.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, LookupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LookupError>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "lookup failed; retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
