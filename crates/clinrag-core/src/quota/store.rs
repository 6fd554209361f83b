//! Quota counter backends

use crate::db::Database;
use crate::error::{ClinragError, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Counter store with a linearizable check-and-increment per key
pub trait QuotaStore: Send + Sync {
    /// Increment the counter if it is below `limit`; report whether it was
    fn try_increment(
        &self,
        model: &str,
        credential: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<bool>;

    /// Current counter value (zero for unseen keys)
    fn count(&self, model: &str, credential: &str, day: NaiveDate) -> Result<u32>;
}

type Key = (String, String, NaiveDate);

/// Process-local store, counters lost on exit
#[derive(Default)]
pub struct MemoryQuotaStore {
    counts: Mutex<HashMap<Key, u32>>,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl QuotaStore for MemoryQuotaStore {
    fn try_increment(
        &self,
        model: &str,
        credential: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<bool> {
        let mut counts = self
            .counts
            .lock()
            .map_err(|e| ClinragError::Other(anyhow::anyhow!("quota lock poisoned: {}", e)))?;

        let count = counts
            .entry((model.to_string(), credential.to_string(), day))
            .or_insert(0);
        if *count >= limit {
            return Ok(false);
        }
        *count += 1;
        Ok(true)
    }

    fn count(&self, model: &str, credential: &str, day: NaiveDate) -> Result<u32> {
        let counts = self
            .counts
            .lock()
            .map_err(|e| ClinragError::Other(anyhow::anyhow!("quota lock poisoned: {}", e)))?;
        Ok(counts
            .get(&(model.to_string(), credential.to_string(), day))
            .copied()
            .unwrap_or(0))
    }
}

/// SQLite-backed store shared across processes through the database file
pub struct SqliteQuotaStore {
    db: Mutex<Database>,
}

impl SqliteQuotaStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open (and initialize) a dedicated connection
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::open(path)?;
        db.initialize()?;
        Ok(Self::new(db))
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self
            .db
            .lock()
            .map_err(|e| ClinragError::Other(anyhow::anyhow!("database lock poisoned: {}", e)))?;
        f(&db)
    }
}

impl QuotaStore for SqliteQuotaStore {
    fn try_increment(
        &self,
        model: &str,
        credential: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<bool> {
        self.with_db(|db| db.try_increment_usage(model, credential, day, limit))
    }

    fn count(&self, model: &str, credential: &str, day: NaiveDate) -> Result<u32> {
        self.with_db(|db| db.usage_count(model, credential, day))
    }
}
