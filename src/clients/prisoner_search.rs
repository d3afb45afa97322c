use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{
    with_retry, InOutStatus, LookupError, Movement, PrisonerLookup, PrisonerStatus, RetryPolicy,
};

const PRISONER_SEARCH: &str = "prisoner-search";
const PRISON_API: &str = "prison-api";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrisonerResponse {
    prisoner_number: String,
    in_out_status: InOutStatus,
    prison_id: Option<String>,
    last_movement_type_code: Option<String>,
    release_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovementResponse {
    movement_date: NaiveDate,
    movement_type: String,
    from_agency: Option<String>,
    to_agency: Option<String>,
}

/// Prisoner status from prisoner search, movement history from prison API.
#[derive(Clone)]
pub struct PrisonerSearchClient {
    client: Client,
    prisoner_search_url: String,
    prison_api_url: String,
    retry: RetryPolicy,
}

impl PrisonerSearchClient {
    pub fn new(
        prisoner_search_url: impl Into<String>,
        prison_api_url: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            prisoner_search_url: prisoner_search_url.into().trim_end_matches('/').to_string(),
            prison_api_url: prison_api_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn fetch_status(&self, prisoner_number: &str) -> Result<Option<PrisonerStatus>, LookupError> {
        let url = format!("{}/prisoner/{}", self.prisoner_search_url, prisoner_number);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| LookupError::from_reqwest(PRISONER_SEARCH, err))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: PrisonerResponse = response
            .error_for_status()
            .map_err(|err| LookupError::from_reqwest(PRISONER_SEARCH, err))?
            .json()
            .await
            .map_err(|err| LookupError::from_reqwest(PRISONER_SEARCH, err))?;

        Ok(Some(PrisonerStatus {
            prisoner_number: body.prisoner_number,
            in_out_status: body.in_out_status,
            current_prison: body.prison_id,
            last_movement_type: body.last_movement_type_code,
            release_date: body.release_date,
        }))
    }

    async fn fetch_movements(
        &self,
        prisoner_number: &str,
        prison_code: &str,
    ) -> Result<Vec<Movement>, LookupError> {
        let url = format!(
            "{}/api/movements/offender/{}",
            self.prison_api_url, prisoner_number
        );
        let response = self
            .client
            .get(&url)
            .query(&[("prisonId", prison_code)])
            .send()
            .await
            .map_err(|err| LookupError::from_reqwest(PRISON_API, err))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let body: Vec<MovementResponse> = response
            .error_for_status()
            .map_err(|err| LookupError::from_reqwest(PRISON_API, err))?
            .json()
            .await
            .map_err(|err| LookupError::from_reqwest(PRISON_API, err))?;

        Ok(body
            .into_iter()
            .map(|movement| Movement {
                movement_date: movement.movement_date,
                movement_type: movement.movement_type,
                from_prison: movement.from_agency,
                to_prison: movement.to_agency,
            })
            .collect())
    }
}

#[async_trait]
impl PrisonerLookup for PrisonerSearchClient {
    async fn prisoner_status(
        &self,
        prisoner_number: &str,
    ) -> Result<Option<PrisonerStatus>, LookupError> {
        with_retry(self.retry, "prisoner_status", move || self.fetch_status(prisoner_number)).await
    }

    async fn movements(
        &self,
        prisoner_number: &str,
        prison_code: &str,
    ) -> Result<Vec<Movement>, LookupError> {
        with_retry(self.retry, "movements", move || {
            self.fetch_movements(prisoner_number, prison_code)
        })
        .await
    }
}

/// Latest movement that took the prisoner out of `prison_code`, if any.
pub fn last_departure<'a>(movements: &'a [Movement], prison_code: &str) -> Option<&'a Movement> {
    movements
        .iter()
        .filter(|movement| movement.from_prison.as_deref() == Some(prison_code))
        .max_by_key(|movement| movement.movement_date)
}

/// True when the prisoner has not come back into `prison_code` since `departure`.
pub fn still_away(movements: &[Movement], prison_code: &str, departure: &Movement) -> bool {
    !movements.iter().any(|movement| {
        movement.to_prison.as_deref() == Some(prison_code)
            && movement.movement_date > departure.movement_date
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(day: u32, from: Option<&str>, to: Option<&str>) -> Movement {
        Movement {
            movement_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            movement_type: "TAP".into(),
            from_prison: from.map(str::to_string),
            to_prison: to.map(str::to_string),
        }
    }

    #[test]
    fn finds_latest_departure_from_prison() {
        let movements = vec![
            movement(1, Some("RSI"), None),
            movement(2, None, Some("RSI")),
            movement(5, Some("RSI"), None),
        ];
        let departure = last_departure(&movements, "RSI").unwrap();
        assert_eq!(departure.movement_date.to_string(), "2024-03-05");
        assert!(still_away(&movements, "RSI", departure));
    }

    #[test]
    fn return_after_departure_means_not_away() {
        let movements = vec![movement(1, Some("RSI"), None), movement(3, None, Some("RSI"))];
        let departure = last_departure(&movements, "RSI").unwrap();
        assert!(!still_away(&movements, "RSI", departure));
    }

    #[test]
    fn parses_prisoner_search_payload() {
        let body: PrisonerResponse = serde_json::from_str(
            r#"{"prisonerNumber":"A1234BC","inOutStatus":"OUT","prisonId":"RSI",
                "lastMovementTypeCode":"TAP","releaseDate":"2030-01-01"}"#,
        )
        .unwrap();
        assert_eq!(body.in_out_status, InOutStatus::Out);
        assert_eq!(body.prison_id.as_deref(), Some("RSI"));
    }
}
