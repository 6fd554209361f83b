//! Ordered fallback across (model, credential) pairs
//!
//! A [`CascadePlan`] lists the pairs to try. The [`CascadeController`]
//! walks it, consuming quota before each network attempt, retrying
//! transient failures with backoff and moving on when an entry is blocked
//! or permanently failing.

mod controller;

pub use controller::{CascadeController, CascadeMetadata, CascadeSuccess};

use crate::error::{ClinragError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// One (model, credential) pair with its daily call budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeEntry {
    pub model: String,
    pub credential: String,
    pub daily_limit: u32,
}

impl CascadeEntry {
    pub fn new(model: impl Into<String>, credential: impl Into<String>, daily_limit: u32) -> Self {
        Self {
            model: model.into(),
            credential: credential.into(),
            daily_limit,
        }
    }
}

/// Validated, non-empty cascade order without duplicate pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    entries: Vec<CascadeEntry>,
}

impl CascadePlan {
    pub fn new(entries: Vec<CascadeEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(ClinragError::Config(
                "cascade plan has no entries".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.model.trim().is_empty() || entry.credential.trim().is_empty() {
                return Err(ClinragError::Config(
                    "cascade entry with empty model or credential".to_string(),
                ));
            }
            if !seen.insert((entry.model.as_str(), entry.credential.as_str())) {
                return Err(ClinragError::Config(format!(
                    "duplicate cascade entry: {}/{}",
                    entry.model, entry.credential
                )));
            }
        }

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CascadeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CascadeEntry> {
        self.entries.iter()
    }
}

/// Per-entry attempt budget with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per entry, first call included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Where an entry ended up during one cascade execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    Attempting,
    Succeeded,
    QuotaBlocked,
    TransientFailed,
    PermanentFailed,
}

impl AttemptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Attempting => "attempting",
            Self::Succeeded => "succeeded",
            Self::QuotaBlocked => "quota_blocked",
            Self::TransientFailed => "transient_failed",
            Self::PermanentFailed => "permanent_failed",
        }
    }

    /// Entry was passed over without producing a result
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::QuotaBlocked | Self::TransientFailed | Self::PermanentFailed
        )
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line for one visited cascade entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub model: String,
    pub credential: String,
    pub state: AttemptState,
    /// Network attempts made against this entry
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl EntryOutcome {
    fn pending(entry: &CascadeEntry) -> Self {
        Self {
            model: entry.model.clone(),
            credential: entry.credential.clone(),
            state: AttemptState::Pending,
            attempts: 0,
            last_error: None,
        }
    }
}
