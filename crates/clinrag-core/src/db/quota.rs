//! Daily generation quota rows

use super::Database;
use crate::error::Result;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, OptionalExtension};

impl Database {
    /// Check-and-increment a quota row in a single immediate transaction.
    ///
    /// Returns `false` without touching the count when it already equals
    /// `daily_limit`.
    pub fn try_increment_usage(
        &self,
        model: &str,
        credential: &str,
        day: NaiveDate,
        daily_limit: u32,
    ) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let day = day.to_string();

        self.with_immediate(|| {
            self.conn.execute(
                "INSERT INTO llm_usage (model, credential, day, count, daily_limit, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?5)
                 ON CONFLICT(model, credential, day) DO NOTHING",
                params![model, credential, day, daily_limit, now],
            )?;

            let updated = self.conn.execute(
                "UPDATE llm_usage
                 SET count = count + 1, daily_limit = ?4, updated_at = ?5
                 WHERE model = ?1 AND credential = ?2 AND day = ?3 AND count < ?4",
                params![model, credential, day, daily_limit, now],
            )?;

            Ok(updated == 1)
        })
    }

    /// Calls recorded for one (model, credential, day)
    pub fn usage_count(&self, model: &str, credential: &str, day: NaiveDate) -> Result<u32> {
        let count: Option<i64> = self
            .conn
            .query_row(
                "SELECT count FROM llm_usage WHERE model = ?1 AND credential = ?2 AND day = ?3",
                params![model, credential, day.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_increment_stops_at_limit() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        assert!(db.try_increment_usage("A", "k1", day(), 2).unwrap());
        assert!(db.try_increment_usage("A", "k1", day(), 2).unwrap());
        assert!(!db.try_increment_usage("A", "k1", day(), 2).unwrap());
        assert_eq!(db.usage_count("A", "k1", day()).unwrap(), 2);
    }

    #[test]
    fn test_day_key_isolation() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        assert!(db.try_increment_usage("A", "k1", day(), 1).unwrap());
        assert!(!db.try_increment_usage("A", "k1", day(), 1).unwrap());

        let next = day().succ_opt().unwrap();
        assert!(db.try_increment_usage("A", "k1", next, 1).unwrap());
        assert_eq!(db.usage_count("A", "k1", next).unwrap(), 1);
        assert_eq!(db.usage_count("A", "k1", day()).unwrap(), 1);
    }

    #[test]
    fn test_zero_limit_never_increments() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        assert!(!db.try_increment_usage("A", "k1", day(), 0).unwrap());
        assert_eq!(db.usage_count("A", "k1", day()).unwrap(), 0);
    }
}
