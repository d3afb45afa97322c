use std::sync::Mutex;

use chrono::{Local, NaiveDate, NaiveDateTime};

/// Source of "now" for every date comparison in the crate.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock pinned to a caller-chosen instant; tests move it with [`FixedClock::set`].
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn on(date: NaiveDate) -> Self {
        Self::new(date.and_hms_opt(3, 0, 0).unwrap_or_default())
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn set_today(&self, date: NaiveDate) {
        self.set(date.and_hms_opt(3, 0, 0).unwrap_or_default());
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_can_be_moved() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let clock = FixedClock::on(start);
        assert_eq!(clock.today(), start);

        let later = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        clock.set_today(later);
        assert_eq!(clock.today(), later);
    }
}
