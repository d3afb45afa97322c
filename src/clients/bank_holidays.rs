use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use super::{with_retry, BankHolidayCalendar, LookupError, RetryPolicy};

const BANK_HOLIDAYS: &str = "bank-holidays";

#[derive(Debug, Deserialize)]
struct Division {
    events: Vec<BankHolidayEvent>,
}

#[derive(Debug, Deserialize)]
struct BankHolidayEvent {
    date: NaiveDate,
}

/// Published UK bank holidays, fetched once and cached for the life of the process.
pub struct GovUkBankHolidays {
    client: Client,
    url: String,
    division: String,
    retry: RetryPolicy,
    cache: RwLock<Option<HashSet<NaiveDate>>>,
}

impl GovUkBankHolidays {
    pub fn new(
        url: impl Into<String>,
        division: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
            division: division.into(),
            retry,
            cache: RwLock::new(None),
        })
    }

    async fn fetch(&self) -> Result<HashSet<NaiveDate>, LookupError> {
        let divisions: HashMap<String, Division> = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| LookupError::from_reqwest(BANK_HOLIDAYS, err))?
            .json()
            .await
            .map_err(|err| LookupError::from_reqwest(BANK_HOLIDAYS, err))?;

        parse_division(divisions, &self.division)
    }
}

fn parse_division(
    mut divisions: HashMap<String, Division>,
    division: &str,
) -> Result<HashSet<NaiveDate>, LookupError> {
    let division = divisions
        .remove(division)
        .ok_or_else(|| LookupError::BadResponse {
            service: BANK_HOLIDAYS,
            message: format!("division {division} missing from calendar"),
        })?;
    Ok(division.events.into_iter().map(|event| event.date).collect())
}

#[async_trait]
impl BankHolidayCalendar for GovUkBankHolidays {
    async fn is_bank_holiday(&self, date: NaiveDate) -> Result<bool, LookupError> {
        if let Some(dates) = self.cache.read().await.as_ref() {
            return Ok(dates.contains(&date));
        }

        let mut guard = self.cache.write().await;
        if guard.is_none() {
            let dates = with_retry(self.retry, "bank_holidays", move || self.fetch()).await?;
            info!(division = %self.division, count = dates.len(), "loaded bank holidays");
            *guard = Some(dates);
        }
        Ok(guard.as_ref().is_some_and(|dates| dates.contains(&date)))
    }
}

/// Calendar with a fixed set of dates.
#[derive(Debug, Default)]
pub struct FixedBankHolidays {
    dates: std::sync::RwLock<HashSet<NaiveDate>>,
}

impl FixedBankHolidays {
    pub fn new(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: std::sync::RwLock::new(dates.into_iter().collect()),
        }
    }

    pub fn add(&self, date: NaiveDate) {
        if let Ok(mut dates) = self.dates.write() {
            dates.insert(date);
        }
    }
}

#[async_trait]
impl BankHolidayCalendar for FixedBankHolidays {
    async fn is_bank_holiday(&self, date: NaiveDate) -> Result<bool, LookupError> {
        Ok(self
            .dates
            .read()
            .map(|dates| dates.contains(&date))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_configured_division() {
        let divisions: HashMap<String, Division> = serde_json::from_str(
            r#"{
                "england-and-wales": {"division": "england-and-wales",
                    "events": [{"title": "Easter Monday", "date": "2024-04-01", "notes": "", "bunting": true}]},
                "scotland": {"division": "scotland",
                    "events": [{"title": "2nd January", "date": "2024-01-02", "notes": "", "bunting": true}]}
            }"#,
        )
        .unwrap();
        let dates = parse_division(divisions, "england-and-wales").unwrap();
        assert!(dates.contains(&NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()));
        assert!(!dates.contains(&NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()));
    }

    #[tokio::test]
    async fn fixed_calendar_answers_from_its_dates() {
        let easter = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let calendar = FixedBankHolidays::new([easter]);
        assert!(calendar.is_bank_holiday(easter).await.unwrap());
        assert!(!calendar
            .is_bank_holiday(easter.succ_opt().unwrap())
            .await
            .unwrap());
    }
}
