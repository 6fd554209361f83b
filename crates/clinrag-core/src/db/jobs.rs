//! Diagnosis job queue

use super::Database;
use crate::error::{ClinragError, Result};
use crate::summary::PatientSnapshot;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle of a queued diagnosis: pending, processing, then one of the
/// two terminal states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One queued diagnosis request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisJob {
    pub id: String,
    pub fingerprint: String,
    pub patient: PatientSnapshot,
    /// Skip reuse of stored results
    pub fresh: bool,
    pub status: JobStatus,
    /// Result produced or copied for this job
    pub diagnosis_id: Option<String>,
    /// Stored result that was reused instead of generating
    pub reuse_source: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn job_id(fingerprint: &str, now: &DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.as_bytes());
    hasher.update(now.to_rfc3339().as_bytes());
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let digest = hasher.finalize();
    let short: String = digest[..6].iter().map(|b| format!("{:02x}", b)).collect();
    format!("job-{}-{}", now.format("%Y%m%d%H%M%S"), short)
}

const JOB_COLUMNS: &str = "id, fingerprint, patient, fresh, status, diagnosis_id, reuse_source,
     error_message, created_at, updated_at";

struct JobRow {
    id: String,
    fingerprint: String,
    patient: String,
    fresh: bool,
    status: String,
    diagnosis_id: Option<String>,
    reuse_source: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            fingerprint: row.get(1)?,
            patient: row.get(2)?,
            fresh: row.get(3)?,
            status: row.get(4)?,
            diagnosis_id: row.get(5)?,
            reuse_source: row.get(6)?,
            error_message: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_job(self) -> Result<DiagnosisJob> {
        let status = JobStatus::parse(&self.status).ok_or_else(|| {
            ClinragError::InvalidInput(format!(
                "job {} has unknown status {}",
                self.id, self.status
            ))
        })?;
        Ok(DiagnosisJob {
            patient: serde_json::from_str(&self.patient)?,
            id: self.id,
            fingerprint: self.fingerprint,
            fresh: self.fresh,
            status,
            diagnosis_id: self.diagnosis_id,
            reuse_source: self.reuse_source,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl Database {
    /// Record a new pending job
    pub fn create_job(&self, patient: &PatientSnapshot, fresh: bool) -> Result<DiagnosisJob> {
        let now = Utc::now();
        let fingerprint = patient.fingerprint();
        let id = job_id(&fingerprint, &now);
        let now = now.to_rfc3339();

        self.conn.execute(
            "INSERT INTO diagnosis_jobs
             (id, fingerprint, patient, fresh, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id,
                fingerprint,
                serde_json::to_string(patient)?,
                fresh,
                JobStatus::Pending.as_str(),
                now
            ],
        )?;

        self.get_job(&id)
    }

    pub fn get_job(&self, id: &str) -> Result<DiagnosisJob> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM diagnosis_jobs WHERE id = ?1", JOB_COLUMNS),
                params![id],
                JobRow::from_row,
            )
            .optional()?
            .ok_or_else(|| ClinragError::JobNotFound(id.to_string()))?;
        row.into_job()
    }

    /// Jobs in submission order, optionally only those in `status`
    pub fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<DiagnosisJob>> {
        let sql = format!(
            "SELECT {} FROM diagnosis_jobs
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY created_at, rowid",
            JOB_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![status.map(|s| s.as_str())], JobRow::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(JobRow::into_job).collect()
    }

    /// Move a pending job to processing. Returns `false` if another worker
    /// already claimed it or it is no longer pending.
    pub fn claim_job(&self, id: &str) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE diagnosis_jobs SET status = ?2, updated_at = ?3
             WHERE id = ?1 AND status = ?4",
            params![
                id,
                JobStatus::Processing.as_str(),
                Utc::now().to_rfc3339(),
                JobStatus::Pending.as_str()
            ],
        )?;
        Ok(updated == 1)
    }

    pub fn complete_job(
        &self,
        id: &str,
        diagnosis_id: &str,
        reuse_source: Option<&str>,
    ) -> Result<()> {
        self.finish_job(id, JobStatus::Completed, Some(diagnosis_id), reuse_source, None)
    }

    pub fn fail_job(&self, id: &str, error_message: &str) -> Result<()> {
        self.finish_job(id, JobStatus::Failed, None, None, Some(error_message))
    }

    fn finish_job(
        &self,
        id: &str,
        status: JobStatus,
        diagnosis_id: Option<&str>,
        reuse_source: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE diagnosis_jobs
             SET status = ?2, diagnosis_id = ?3, reuse_source = ?4, error_message = ?5, updated_at = ?6
             WHERE id = ?1",
            params![
                id,
                status.as_str(),
                diagnosis_id,
                reuse_source,
                error_message,
                Utc::now().to_rfc3339()
            ],
        )?;
        if updated == 0 {
            return Err(ClinragError::JobNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> PatientSnapshot {
        PatientSnapshot {
            age: 45,
            sex: "M".to_string(),
            chief_complaint: "Headache".to_string(),
            symptoms: "Worst headache of life, neck stiffness".to_string(),
            past_medical_history: None,
            medications: None,
            clinical_notes: None,
            vitals: None,
            labs: None,
        }
    }

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_job_lifecycle() {
        let db = setup();
        let job = db.create_job(&patient(), false).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.fingerprint, patient().fingerprint());
        assert_eq!(job.patient, patient());
        assert!(job.id.starts_with("job-"));

        assert!(db.claim_job(&job.id).unwrap());
        assert!(!db.claim_job(&job.id).unwrap());
        assert_eq!(db.get_job(&job.id).unwrap().status, JobStatus::Processing);

        db.complete_job(&job.id, "dx-1", Some("dx-0")).unwrap();
        let done = db.get_job(&job.id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.diagnosis_id.as_deref(), Some("dx-1"));
        assert_eq!(done.reuse_source.as_deref(), Some("dx-0"));
        assert!(done.status.is_terminal());
    }

    #[test]
    fn test_failed_job_keeps_message() {
        let db = setup();
        let job = db.create_job(&patient(), true).unwrap();
        assert!(job.fresh);
        db.fail_job(&job.id, "all 3 cascade entries failed").unwrap();

        let failed = db.get_job(&job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(
            failed.error_message.as_deref(),
            Some("all 3 cascade entries failed")
        );
        assert!(failed.diagnosis_id.is_none());
    }

    #[test]
    fn test_list_by_status_in_submission_order() {
        let db = setup();
        let first = db.create_job(&patient(), false).unwrap();
        let second = db.create_job(&patient(), false).unwrap();
        assert_ne!(first.id, second.id);
        db.fail_job(&first.id, "boom").unwrap();

        let pending = db.list_jobs(Some(JobStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);

        let all: Vec<String> = db.list_jobs(None).unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(all, vec![first.id, second.id]);
    }

    #[test]
    fn test_unknown_job() {
        let db = setup();
        assert!(matches!(db.get_job("job-x"), Err(ClinragError::JobNotFound(_))));
        assert!(matches!(
            db.fail_job("job-x", "e"),
            Err(ClinragError::JobNotFound(_))
        ));
    }
}
