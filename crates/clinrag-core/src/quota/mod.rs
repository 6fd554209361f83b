//! Per-(model, credential) daily quota enforcement
//!
//! Counts live in a [`QuotaStore`]; the tracker only knows the configured
//! limits and asks the injected [`Clock`] which day it is, so a day
//! change resets quota by switching keys rather than by mutation.

mod store;

pub use store::{MemoryQuotaStore, QuotaStore, SqliteQuotaStore};

use crate::cascade::CascadePlan;
use crate::clock::Clock;
use crate::error::{ClinragError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One quota row: calls made by a (model, credential) pair on a day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    pub model: String,
    pub credential: String,
    pub day: NaiveDate,
    pub count: u32,
    pub daily_limit: u32,
}

impl QuotaRecord {
    pub fn remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.count)
    }
}

/// Enforces daily limits for the pairs of a cascade plan
pub struct QuotaTracker {
    store: Arc<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    limits: HashMap<(String, String), u32>,
    order: Vec<(String, String)>,
}

impl QuotaTracker {
    pub fn new(plan: &CascadePlan, store: Arc<dyn QuotaStore>, clock: Arc<dyn Clock>) -> Self {
        let mut limits = HashMap::new();
        let mut order = Vec::new();
        for entry in plan.entries() {
            let key = (entry.model.clone(), entry.credential.clone());
            if limits.insert(key.clone(), entry.daily_limit).is_none() {
                order.push(key);
            }
        }
        Self {
            store,
            clock,
            limits,
            order,
        }
    }

    fn limit_for(&self, model: &str, credential: &str) -> Result<u32> {
        self.limits
            .get(&(model.to_string(), credential.to_string()))
            .copied()
            .ok_or_else(|| {
                ClinragError::Config(format!(
                    "no quota configured for {} with credential {}",
                    model, credential
                ))
            })
    }

    /// Atomically claim one call for today. `false` means the limit is
    /// already reached and nothing was recorded.
    pub fn try_consume(&self, model: &str, credential: &str) -> Result<bool> {
        let limit = self.limit_for(model, credential)?;
        let today = self.clock.today();
        let claimed = self.store.try_increment(model, credential, today, limit)?;
        tracing::debug!(
            "Quota claim {}/{} on {}: {}",
            model,
            credential,
            today,
            if claimed { "granted" } else { "blocked" }
        );
        Ok(claimed)
    }

    /// Calls left today for a pair
    pub fn remaining(&self, model: &str, credential: &str) -> Result<u32> {
        let limit = self.limit_for(model, credential)?;
        let used = self.store.count(model, credential, self.clock.today())?;
        Ok(limit.saturating_sub(used))
    }

    /// Today's record for every configured pair, in cascade order
    pub fn usage(&self) -> Result<Vec<QuotaRecord>> {
        let today = self.clock.today();
        self.order
            .iter()
            .map(|(model, credential)| {
                Ok(QuotaRecord {
                    model: model.clone(),
                    credential: credential.clone(),
                    day: today,
                    count: self.store.count(model, credential, today)?,
                    daily_limit: self.limits[&(model.clone(), credential.clone())],
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::CascadeEntry;
    use crate::clock::FixedClock;

    fn tracker(clock: Arc<FixedClock>) -> QuotaTracker {
        let plan = CascadePlan::new(vec![
            CascadeEntry::new("A", "k1", 2),
            CascadeEntry::new("B", "k1", 5),
        ])
        .unwrap();
        QuotaTracker::new(&plan, Arc::new(MemoryQuotaStore::new()), clock)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_consume_until_limit() {
        let tracker = tracker(Arc::new(FixedClock::new(day())));
        assert!(tracker.try_consume("A", "k1").unwrap());
        assert_eq!(tracker.remaining("A", "k1").unwrap(), 1);
        assert!(tracker.try_consume("A", "k1").unwrap());
        assert!(!tracker.try_consume("A", "k1").unwrap());
        assert_eq!(tracker.remaining("A", "k1").unwrap(), 0);
        assert_eq!(tracker.remaining("B", "k1").unwrap(), 5);
    }

    #[test]
    fn test_new_day_resets() {
        let clock = Arc::new(FixedClock::new(day()));
        let tracker = tracker(clock.clone());
        assert!(tracker.try_consume("A", "k1").unwrap());
        assert!(tracker.try_consume("A", "k1").unwrap());
        assert!(!tracker.try_consume("A", "k1").unwrap());

        clock.advance_days(1);
        assert_eq!(tracker.remaining("A", "k1").unwrap(), 2);
        assert!(tracker.try_consume("A", "k1").unwrap());
    }

    #[test]
    fn test_unknown_pair_is_config_error() {
        let tracker = tracker(Arc::new(FixedClock::new(day())));
        assert!(matches!(
            tracker.try_consume("C", "k1"),
            Err(ClinragError::Config(_))
        ));
    }

    #[test]
    fn test_usage_in_cascade_order() {
        let tracker = tracker(Arc::new(FixedClock::new(day())));
        tracker.try_consume("B", "k1").unwrap();

        let usage = tracker.usage().unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].model, "A");
        assert_eq!(usage[0].count, 0);
        assert_eq!(usage[1].count, 1);
        assert_eq!(usage[1].remaining(), 4);
    }
}
