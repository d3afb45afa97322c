use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The three daily session windows a prison runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeSlot {
    Am,
    Pm,
    Ed,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 3] = [TimeSlot::Am, TimeSlot::Pm, TimeSlot::Ed];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::Am => "AM",
            TimeSlot::Pm => "PM",
            TimeSlot::Ed => "ED",
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeSlot {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "AM" => Ok(TimeSlot::Am),
            "PM" => Ok(TimeSlot::Pm),
            "ED" => Ok(TimeSlot::Ed),
            other => Err(format!("unknown time slot {other}")),
        }
    }
}

pub fn weekday_number(day: Weekday) -> i32 {
    day.number_from_monday() as i32
}

pub fn weekday_from_number(number: i32) -> Option<Weekday> {
    match number {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: NaiveTime,
    pub finish: NaiveTime,
}

impl SessionWindow {
    pub fn new(start: NaiveTime, finish: NaiveTime) -> Self {
        Self { start, finish }
    }
}

/// Default AM/PM/ED windows for one prison on one day of the week.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrisonRegime {
    pub prison_code: String,
    pub day_of_week: Weekday,
    pub am: SessionWindow,
    pub pm: SessionWindow,
    pub ed: SessionWindow,
}

impl PrisonRegime {
    pub fn window(&self, slot: TimeSlot) -> SessionWindow {
        match slot {
            TimeSlot::Am => self.am,
            TimeSlot::Pm => self.pm,
            TimeSlot::Ed => self.ed,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegimeError {
    #[error("no regime configured for prison {prison_code} on {day_of_week} ({time_slot})")]
    Missing {
        prison_code: String,
        day_of_week: Weekday,
        time_slot: TimeSlot,
    },
    #[error("invalid regime for prison {prison_code}: {reason}")]
    Invalid { prison_code: String, reason: String },
}

/// Typed lookup table of regime rows, validated when built.
#[derive(Debug, Clone, Default)]
pub struct RegimeRegistry {
    entries: HashMap<(String, Weekday), PrisonRegime>,
}

impl RegimeRegistry {
    pub fn from_rows(rows: impl IntoIterator<Item = PrisonRegime>) -> Result<Self, RegimeError> {
        let mut entries = HashMap::new();
        for row in rows {
            for slot in TimeSlot::ALL {
                let window = row.window(slot);
                if window.start >= window.finish {
                    return Err(RegimeError::Invalid {
                        prison_code: row.prison_code.clone(),
                        reason: format!(
                            "{} {slot} starts at {} but finishes at {}",
                            row.day_of_week, window.start, window.finish
                        ),
                    });
                }
            }

            let key = (row.prison_code.clone(), row.day_of_week);
            if entries.contains_key(&key) {
                return Err(RegimeError::Invalid {
                    prison_code: row.prison_code,
                    reason: format!("more than one regime row for {}", key.1),
                });
            }
            entries.insert(key, row);
        }
        Ok(Self { entries })
    }

    pub fn window(
        &self,
        prison_code: &str,
        day_of_week: Weekday,
        time_slot: TimeSlot,
    ) -> Result<SessionWindow, RegimeError> {
        self.entries
            .get(&(prison_code.to_string(), day_of_week))
            .map(|regime| regime.window(time_slot))
            .ok_or_else(|| RegimeError::Missing {
                prison_code: prison_code.to_string(),
                day_of_week,
                time_slot,
            })
    }
}

/// One entry of the regime import document read by the maintenance binary.
#[derive(Debug, Clone, Deserialize)]
pub struct RegimeImportRow {
    pub prison_code: String,
    pub day_of_week: String,
    pub am: (NaiveTime, NaiveTime),
    pub pm: (NaiveTime, NaiveTime),
    pub ed: (NaiveTime, NaiveTime),
}

impl RegimeImportRow {
    pub fn into_regime(self) -> Result<PrisonRegime, RegimeError> {
        let day_of_week =
            Weekday::from_str(&self.day_of_week).map_err(|_| RegimeError::Invalid {
                prison_code: self.prison_code.clone(),
                reason: format!("unknown day of week {}", self.day_of_week),
            })?;
        Ok(PrisonRegime {
            prison_code: self.prison_code,
            day_of_week,
            am: SessionWindow::new(self.am.0, self.am.1),
            pm: SessionWindow::new(self.pm.0, self.pm.1),
            ed: SessionWindow::new(self.ed.0, self.ed.1),
        })
    }
}

/// Parses an import document and validates it as a registry before returning the rows.
pub fn parse_regime_import(raw: &str) -> anyhow::Result<Vec<PrisonRegime>> {
    let rows: Vec<RegimeImportRow> = serde_json::from_str(raw)?;
    let regimes = rows
        .into_iter()
        .map(RegimeImportRow::into_regime)
        .collect::<Result<Vec<_>, _>>()?;
    RegimeRegistry::from_rows(regimes.clone())?;
    Ok(regimes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn regime(prison: &str, day: Weekday) -> PrisonRegime {
        PrisonRegime {
            prison_code: prison.to_string(),
            day_of_week: day,
            am: SessionWindow::new(time(8, 25), time(11, 35)),
            pm: SessionWindow::new(time(13, 40), time(16, 50)),
            ed: SessionWindow::new(time(18, 0), time(20, 0)),
        }
    }

    #[test]
    fn looks_up_window_by_prison_day_and_slot() {
        let registry = RegimeRegistry::from_rows([regime("RSI", Weekday::Mon)]).unwrap();
        let window = registry.window("RSI", Weekday::Mon, TimeSlot::Pm).unwrap();
        assert_eq!(window.start, time(13, 40));
        assert_eq!(window.finish, time(16, 50));
    }

    #[test]
    fn missing_day_names_the_gap() {
        let registry = RegimeRegistry::from_rows([regime("RSI", Weekday::Mon)]).unwrap();
        let err = registry
            .window("RSI", Weekday::Tue, TimeSlot::Am)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no regime configured for prison RSI on Tue (AM)"
        );
    }

    #[test]
    fn rejects_duplicate_rows() {
        let err = RegimeRegistry::from_rows([
            regime("RSI", Weekday::Mon),
            regime("RSI", Weekday::Mon),
        ])
        .unwrap_err();
        assert!(matches!(err, RegimeError::Invalid { .. }));
    }

    #[test]
    fn rejects_inverted_window() {
        let mut row = regime("RSI", Weekday::Wed);
        row.ed = SessionWindow::new(time(20, 0), time(18, 0));
        assert!(RegimeRegistry::from_rows([row]).is_err());
    }

    #[test]
    fn parses_import_document() {
        let raw = r#"[
            {"prison_code": "RSI", "day_of_week": "Monday",
             "am": ["08:25:00", "11:35:00"],
             "pm": ["13:40:00", "16:50:00"],
             "ed": ["18:00:00", "20:00:00"]}
        ]"#;
        let rows = parse_regime_import(raw).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].day_of_week, Weekday::Mon);
        assert_eq!(rows[0].am.start, time(8, 25));
    }
}
