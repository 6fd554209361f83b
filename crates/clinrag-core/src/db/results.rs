//! Stored diagnosis results

use super::Database;
use crate::error::{ClinragError, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

/// Serialized diagnosis result as persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDiagnosis {
    pub id: String,
    pub fingerprint: Option<String>,
    /// Result this row was copied from, if any
    pub source_result: Option<String>,
    pub payload: String,
    pub created_at: String,
}

impl Database {
    /// Persist a serialized result under its id
    pub fn save_diagnosis(
        &self,
        id: &str,
        fingerprint: Option<&str>,
        source_result: Option<&str>,
        payload: &str,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO diagnosis_results (id, fingerprint, source_result, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, fingerprint, source_result, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recent result stored for a case fingerprint
    pub fn latest_diagnosis(&self, fingerprint: &str) -> Result<Option<StoredDiagnosis>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, fingerprint, source_result, payload, created_at FROM diagnosis_results
                 WHERE fingerprint = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                params![fingerprint],
                row_to_stored,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_diagnosis(&self, id: &str) -> Result<StoredDiagnosis> {
        self.conn
            .query_row(
                "SELECT id, fingerprint, source_result, payload, created_at FROM diagnosis_results
                 WHERE id = ?1",
                params![id],
                row_to_stored,
            )
            .optional()?
            .ok_or_else(|| ClinragError::DiagnosisNotFound(id.to_string()))
    }

    pub fn count_diagnoses(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM diagnosis_results", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredDiagnosis> {
    Ok(StoredDiagnosis {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        source_result: row.get(2)?,
        payload: row.get(3)?,
        created_at: row.get(4)?,
    })
}
