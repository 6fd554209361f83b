//! Injected clock for quota day boundaries

use chrono::{Days, NaiveDate, Utc};
use std::sync::Mutex;

/// Source of "today" for quota bookkeeping
pub trait Clock: Send + Sync {
    /// Calendar day used as the quota key
    fn today(&self) -> NaiveDate;
}

/// Wall clock, UTC calendar days
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    day: Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day: Mutex::new(day),
        }
    }

    /// Move the clock to another day
    pub fn set(&self, day: NaiveDate) {
        if let Ok(mut guard) = self.day.lock() {
            *guard = day;
        }
    }

    /// Advance by whole days
    pub fn advance_days(&self, days: u64) {
        if let Ok(mut guard) = self.day.lock() {
            if let Some(next) = guard.checked_add_days(Days::new(days)) {
                *guard = next;
            }
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        match self.day.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        clock.advance_days(1);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }

    #[test]
    fn test_fixed_clock_set() {
        let clock = FixedClock::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let later = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        clock.set(later);
        assert_eq!(clock.today(), later);
    }
}
