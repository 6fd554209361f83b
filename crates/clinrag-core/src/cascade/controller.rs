//! Cascade execution

use super::{AttemptState, CascadePlan, EntryOutcome, RetryPolicy};
use crate::config::Credential;
use crate::error::{ClinragError, Result};
use crate::llm::{GenerationRequest, GenerationTransport, TransportError};
use crate::quota::QuotaTracker;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Which entry answered and what it took to get there
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeMetadata {
    pub model: String,
    pub credential: String,
    /// Position of the answering entry in the plan
    pub entry_index: usize,
    /// Attempts made against the answering entry
    pub attempts: u32,
    /// Attempts across every visited entry
    pub total_attempts: u32,
    /// Attempts beyond the first on each visited entry
    pub retries: u32,
    /// Entries passed over before the answer
    pub skipped_entries: usize,
    pub outcomes: Vec<EntryOutcome>,
}

impl CascadeMetadata {
    fn new(entry_index: usize, outcomes: Vec<EntryOutcome>) -> Self {
        let (model, credential, attempts) = outcomes
            .last()
            .map(|o| (o.model.clone(), o.credential.clone(), o.attempts))
            .unwrap_or_default();
        let total_attempts: u32 = outcomes.iter().map(|o| o.attempts).sum();
        let visited = outcomes.iter().filter(|o| o.attempts > 0).count() as u32;

        Self {
            model,
            credential,
            entry_index,
            attempts,
            total_attempts,
            retries: total_attempts.saturating_sub(visited),
            skipped_entries: outcomes.iter().filter(|o| o.state.is_skip()).count(),
            outcomes,
        }
    }
}

/// Validated value plus the raw text it came from
#[derive(Debug, Clone)]
pub struct CascadeSuccess<T> {
    pub value: T,
    pub raw: String,
    pub metadata: CascadeMetadata,
}

/// Walks a cascade plan until one entry yields a valid response
pub struct CascadeController {
    plan: CascadePlan,
    quota: Arc<QuotaTracker>,
    transport: Arc<dyn GenerationTransport>,
    credentials: HashMap<String, Credential>,
    retry: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl CascadeController {
    pub fn new(
        plan: CascadePlan,
        quota: Arc<QuotaTracker>,
        transport: Arc<dyn GenerationTransport>,
        credentials: Vec<Credential>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let credentials: HashMap<String, Credential> = credentials
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        if let Some(entry) = plan
            .iter()
            .find(|e| !credentials.contains_key(&e.credential))
        {
            return Err(ClinragError::Config(format!(
                "no credential named {} for cascade entry {}",
                entry.credential, entry.model
            )));
        }

        Ok(Self {
            plan,
            quota,
            transport,
            credentials,
            retry: RetryPolicy {
                max_attempts: retry.max_attempts.max(1),
                ..retry
            },
            attempt_timeout: None,
        })
    }

    /// Bound each network attempt; an elapsed attempt counts as transient
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn plan(&self) -> &CascadePlan {
        &self.plan
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Run the cascade for one request.
    ///
    /// `validate` turns raw text into the caller's value; an error from it
    /// marks the response malformed. The first malformed response on an
    /// entry is regenerated immediately and that regeneration does not count
    /// against `max_attempts`, so it happens even with a budget of one.
    /// Later malformed responses back off like transient failures. Every
    /// attempt, regenerations included, consumes quota first.
    pub async fn execute<T, F>(
        &self,
        request: &GenerationRequest,
        deadline: Option<Instant>,
        validate: F,
    ) -> Result<CascadeSuccess<T>>
    where
        F: Fn(&str) -> Result<T>,
    {
        let mut outcomes: Vec<EntryOutcome> = Vec::with_capacity(self.plan.len());

        for (index, entry) in self.plan.iter().enumerate() {
            let credential = self.credentials.get(&entry.credential).ok_or_else(|| {
                ClinragError::Config(format!("no credential named {}", entry.credential))
            })?;
            let mut outcome = EntryOutcome::pending(entry);
            let mut regenerated = false;

            loop {
                if budgeted(&outcome, regenerated) >= self.retry.max_attempts {
                    outcome.state = AttemptState::TransientFailed;
                    break;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    outcomes.push(outcome);
                    return Err(ClinragError::DeadlineExceeded { outcomes });
                }
                if !self.quota.try_consume(&entry.model, &entry.credential)? {
                    tracing::warn!(
                        "Daily quota reached for {}/{}, skipping",
                        entry.model,
                        entry.credential
                    );
                    outcome.state = AttemptState::QuotaBlocked;
                    if outcome.last_error.is_none() {
                        outcome.last_error = Some("daily quota exhausted".to_string());
                    }
                    break;
                }

                outcome.attempts += 1;
                outcome.state = AttemptState::Attempting;
                tracing::debug!(
                    "Generation attempt {}/{} on {}/{}",
                    outcome.attempts,
                    self.retry.max_attempts,
                    entry.model,
                    entry.credential
                );

                let call = self.attempt(request, &entry.model, credential);
                let Some(result) = until_deadline(deadline, call).await else {
                    outcome.state = AttemptState::TransientFailed;
                    outcome.last_error = Some("cancelled at request deadline".to_string());
                    outcomes.push(outcome);
                    return Err(ClinragError::DeadlineExceeded { outcomes });
                };

                let failure = match result {
                    Ok(text) => match validate(&text) {
                        Ok(value) => {
                            outcome.state = AttemptState::Succeeded;
                            outcomes.push(outcome);
                            tracing::info!(
                                "Generation succeeded on {}/{} (entry {})",
                                entry.model,
                                entry.credential,
                                index + 1
                            );
                            return Ok(CascadeSuccess {
                                value,
                                raw: text,
                                metadata: CascadeMetadata::new(index, outcomes),
                            });
                        }
                        Err(e) => {
                            tracing::warn!(
                                "Malformed response from {}/{}: {}",
                                entry.model,
                                entry.credential,
                                e
                            );
                            tracing::debug!("Raw LLM response: {}", text);
                            if !regenerated {
                                regenerated = true;
                                outcome.last_error = Some(e.to_string());
                                continue;
                            }
                            e.to_string()
                        }
                    },
                    Err(TransportError::QuotaExceeded(msg)) => {
                        tracing::warn!(
                            "Provider quota exceeded for {}/{} (key {}): {}",
                            entry.model,
                            entry.credential,
                            key_label(credential),
                            msg
                        );
                        outcome.state = AttemptState::QuotaBlocked;
                        outcome.last_error = Some(msg);
                        break;
                    }
                    Err(TransportError::Permanent(msg)) => {
                        tracing::warn!(
                            "Permanent failure on {}/{} (key {}): {}",
                            entry.model,
                            entry.credential,
                            key_label(credential),
                            msg
                        );
                        outcome.state = AttemptState::PermanentFailed;
                        outcome.last_error = Some(msg);
                        break;
                    }
                    Err(TransportError::Transient(msg)) => msg,
                };

                outcome.state = AttemptState::TransientFailed;
                outcome.last_error = Some(failure);
                let spent = budgeted(&outcome, regenerated);
                if spent >= self.retry.max_attempts {
                    break;
                }

                let delay = self.retry.delay_for(spent);
                tracing::warn!(
                    "Transient failure on {}/{} (attempt {}/{}), retrying in {:?}",
                    entry.model,
                    entry.credential,
                    spent,
                    self.retry.max_attempts,
                    delay
                );
                if until_deadline(deadline, tokio::time::sleep(delay))
                    .await
                    .is_none()
                {
                    outcomes.push(outcome);
                    return Err(ClinragError::DeadlineExceeded { outcomes });
                }
            }

            tracing::info!(
                "Cascade entry {}/{} ended {}, moving on",
                entry.model,
                entry.credential,
                outcome.state
            );
            outcomes.push(outcome);
        }

        tracing::warn!("All {} cascade entries failed", outcomes.len());
        Err(ClinragError::CascadeExhausted { outcomes })
    }

    async fn attempt(
        &self,
        request: &GenerationRequest,
        model: &str,
        credential: &Credential,
    ) -> std::result::Result<String, TransportError> {
        let call = self.transport.generate(request, model, credential);
        match self.attempt_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .unwrap_or_else(|_| {
                    Err(TransportError::Transient(format!(
                        "attempt timed out after {:?}",
                        timeout
                    )))
                }),
            None => call.await,
        }
    }
}

/// Attempts charged to the retry budget; the one regeneration is free
fn budgeted(outcome: &EntryOutcome, regenerated: bool) -> u32 {
    outcome.attempts.saturating_sub(u32::from(regenerated))
}

/// Secret fingerprint for log lines, never the secret itself
fn key_label(credential: &Credential) -> String {
    credential
        .fingerprint()
        .unwrap_or_else(|| "unset".to_string())
}

/// `None` when the deadline passes first; the future is dropped
async fn until_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}
