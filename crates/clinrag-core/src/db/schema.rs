//! Database schema and initialization

use crate::error::Result;
use rusqlite::{params, Connection};
use std::path::Path;

/// Main database handle
pub struct Database {
    pub(crate) conn: Connection,
}

const SCHEMA_VERSION: i32 = 2;

const CREATE_TABLES: &str = r#"
-- Knowledge base cases with their encoder output
CREATE TABLE IF NOT EXISTS knowledge_cases (
    case_id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    narrative TEXT NOT NULL,
    diagnosis TEXT NOT NULL,
    outcome TEXT,
    embedding BLOB NOT NULL,
    model TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Set by every full knowledge base load, even an empty one
CREATE TABLE IF NOT EXISTS knowledge_base_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    loaded_at TEXT NOT NULL,
    model TEXT NOT NULL,
    dimensions INTEGER NOT NULL
);

-- Daily generation quota per (model, credential)
CREATE TABLE IF NOT EXISTS llm_usage (
    model TEXT NOT NULL,
    credential TEXT NOT NULL,
    day TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    daily_limit INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (model, credential, day),
    CHECK (count <= daily_limit)
);

-- Produced diagnosis results, reusable by case fingerprint
CREATE TABLE IF NOT EXISTS diagnosis_results (
    id TEXT PRIMARY KEY,
    fingerprint TEXT,
    source_result TEXT,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Queued diagnosis requests and how they ended
CREATE TABLE IF NOT EXISTS diagnosis_jobs (
    id TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    patient TEXT NOT NULL,
    fresh INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    diagnosis_id TEXT,
    reuse_source TEXT,
    error_message TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_knowledge_cases_position ON knowledge_cases(position);
CREATE INDEX IF NOT EXISTS idx_llm_usage_day ON llm_usage(day);
CREATE INDEX IF NOT EXISTS idx_diagnosis_results_fingerprint ON diagnosis_results(fingerprint);
CREATE INDEX IF NOT EXISTS idx_diagnosis_jobs_status ON diagnosis_jobs(status, created_at);
"#;

impl Database {
    /// Open database at path, creating if necessary
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Initialize database schema
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )?;

        self.conn.execute_batch(CREATE_TABLES)?;

        // Upgrade existing databases before recording the version
        self.migrate()?;

        self.conn.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;

        Ok(())
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<Option<i32>> {
        let version = self
            .conn
            .query_row(
                "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();
        Ok(version)
    }

    /// Run migrations to upgrade schema to current version
    pub fn migrate(&self) -> Result<()> {
        let current = self.schema_version()?.unwrap_or(0);

        if current < 2 {
            self.migrate_to_v2()?;
        }

        Ok(())
    }

    fn migrate_to_v2(&self) -> Result<()> {
        // Results written before reuse provenance existed
        let has_source: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('diagnosis_results') WHERE name = 'source_result'",
            [],
            |row| row.get(0),
        )?;

        if !has_source {
            self.conn
                .execute("ALTER TABLE diagnosis_results ADD COLUMN source_result TEXT", [])?;
        }

        Ok(())
    }

    /// Run `f` inside an immediate transaction, rolling back on error
    pub(crate) fn with_immediate<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.conn.execute("BEGIN IMMEDIATE", [])?;
        let result = f();

        if result.is_ok() {
            self.conn.execute("COMMIT", [])?;
        } else {
            let _ = self.conn.execute("ROLLBACK", []);
        }
        result
    }
}
