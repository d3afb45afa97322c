//! Weekly pattern resolution: turns a schedule's slot rotation into concrete
//! session times for a calendar date.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveTime};
use tracing::warn;

use crate::regime::{RegimeError, RegimeRegistry, TimeSlot};
use crate::schedule::{Schedule, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSession {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub time_slot: TimeSlot,
    pub week_number: i32,
}

/// Week of the rotation (1-based) that `date` falls in, counted from the schedule start date.
pub fn rotation_week(schedule: &Schedule, date: NaiveDate) -> Option<i32> {
    if date < schedule.start_date || schedule.schedule_weeks < 1 {
        return None;
    }
    let days = (date - schedule.start_date).num_days();
    let weeks = i64::from(schedule.schedule_weeks);
    Some(((days / 7) % weeks + 1) as i32)
}

/// Every session `schedule` runs on `date`, at most one per time slot, ordered AM, PM, ED.
pub fn resolve(
    schedule: &Schedule,
    date: NaiveDate,
    regime: &RegimeRegistry,
) -> Result<Vec<ResolvedSession>, RegimeError> {
    if !schedule.runs_on(date) {
        return Ok(Vec::new());
    }
    let Some(week_number) = rotation_week(schedule, date) else {
        return Ok(Vec::new());
    };
    let day = date.weekday();

    let mut by_slot: BTreeMap<TimeSlot, Vec<&Slot>> = BTreeMap::new();
    for slot in schedule
        .slots
        .iter()
        .filter(|slot| slot.runs_on(week_number, day))
    {
        by_slot.entry(slot.time_slot).or_default().push(slot);
    }

    let mut sessions = Vec::with_capacity(by_slot.len());
    for (time_slot, candidates) in by_slot {
        let slot = pick_slot(schedule, date, &candidates);
        let (start_time, end_time) = match slot.custom_window() {
            Some(window) => window,
            None => {
                let window = regime.window(&schedule.prison_code, day, time_slot)?;
                (window.start, window.finish)
            }
        };
        sessions.push(ResolvedSession {
            start_time,
            end_time,
            time_slot,
            week_number,
        });
    }
    Ok(sessions)
}

/// Most recently edited slot wins; id breaks exact ties so the result never depends on load order.
fn pick_slot<'a>(schedule: &Schedule, date: NaiveDate, candidates: &[&'a Slot]) -> &'a Slot {
    let chosen = candidates
        .iter()
        .copied()
        .max_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)))
        .unwrap_or(candidates[0]);
    if candidates.len() > 1 {
        warn!(
            schedule_id = %schedule.id,
            %date,
            time_slot = %chosen.time_slot,
            candidates = candidates.len(),
            chosen_slot_id = %chosen.id,
            "overlapping slot definitions; using most recently edited"
        );
    }
    chosen
}
