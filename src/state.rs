use std::sync::Arc;

use reqwest::Client;

use crate::{
    clients::{BankHolidayCalendar, GovUkBankHolidays, PrisonerLookup, PrisonerSearchClient},
    clock::{Clock, SystemClock},
    config::AppConfig,
    events::{EventPublisher, TracingPublisher, WebhookPublisher},
    store::ActivityStore,
};

/// Everything the scheduling engine needs, shared by the HTTP server,
/// the scheduler loop and the tests.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ActivityStore>,
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
    pub prisoners: Arc<dyn PrisonerLookup>,
    pub bank_holidays: Arc<dyn BankHolidayCalendar>,
    pub publisher: Arc<dyn EventPublisher>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        config: AppConfig,
        clock: Arc<dyn Clock>,
        prisoners: Arc<dyn PrisonerLookup>,
        bank_holidays: Arc<dyn BankHolidayCalendar>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            config: Arc::new(config),
            clock,
            prisoners,
            bank_holidays,
            publisher,
        }
    }

    /// Wires the HTTP-backed collaborators described by `config`.
    pub fn from_config(store: Arc<dyn ActivityStore>, config: AppConfig) -> anyhow::Result<Self> {
        let retry = config.scheduling.retry_policy();
        let prisoners = Arc::new(PrisonerSearchClient::new(
            config.prisoner_search_url.clone(),
            config.prison_api_url.clone(),
            retry,
        )?);
        let bank_holidays = Arc::new(GovUkBankHolidays::new(
            config.bank_holidays_url.clone(),
            config.bank_holiday_division.clone(),
            retry,
        )?);
        let publisher: Arc<dyn EventPublisher> = match config.events_webhook_url.as_ref() {
            Some(url) => Arc::new(WebhookPublisher::new(Client::new(), url.clone())),
            None => Arc::new(TracingPublisher),
        };

        Ok(Self::new(
            store,
            config,
            Arc::new(SystemClock),
            prisoners,
            bank_holidays,
            publisher,
        ))
    }
}
