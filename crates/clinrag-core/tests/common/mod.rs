//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use clinrag_core::{
    CascadeController, CascadeEntry, CascadePlan, Credential, FixedClock, GenerationRequest,
    GenerationTransport, MemoryQuotaStore, QuotaTracker, RetryPolicy, TransportError,
};
use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted reply for one transport call
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(TransportError),
    /// Never answers on its own
    Hang,
}

/// Transport whose replies are scripted per (model, credential)
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<(String, String), VecDeque<Step>>>,
    fallback: Step,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedTransport {
    /// Every unscripted call gets `fallback`
    pub fn new(fallback: Step) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn script(self, model: &str, credential: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert((model.to_string(), credential.to_string()), steps.into());
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn generate(
        &self,
        _request: &GenerationRequest,
        model: &str,
        credential: &Credential,
    ) -> Result<String, TransportError> {
        let key = (model.to_string(), credential.id.clone());
        self.calls.lock().unwrap().push(key.clone());

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Reply(text) => Ok(text),
            Step::Fail(e) => Err(e),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(TransportError::Transient("hung call finished".to_string()))
            }
        }
    }
}

pub fn valid_response(first: &str) -> String {
    format!(
        r#"```json
{{
  "differential_diagnoses": [
    {{"diagnosis": "{}", "confidence": 0.6, "rationale": "Consistent with MIMIC-001"}},
    {{"diagnosis": "Unstable Angina", "confidence": 0.25, "rationale": "Possible given history"}}
  ],
  "triage_level": "HIGH",
  "explanation": "Presentation resembles MIMIC-001.",
  "confidence_score": 0.6
}}
```"#,
        first
    )
}

pub fn ok() -> Step {
    Step::Reply(valid_response("Acute Myocardial Infarction"))
}

pub fn transient() -> Step {
    Step::Fail(FailureKind::Transient.into())
}

pub fn permanent() -> Step {
    Step::Fail(FailureKind::Permanent.into())
}

pub fn quota_exceeded() -> Step {
    Step::Fail(FailureKind::Quota.into())
}

pub enum FailureKind {
    Transient,
    Permanent,
    Quota,
}

impl From<FailureKind> for TransportError {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Transient => TransportError::Transient("HTTP 503: unavailable".into()),
            FailureKind::Permanent => TransportError::Permanent("HTTP 401: invalid key".into()),
            FailureKind::Quota => {
                TransportError::QuotaExceeded("HTTP 429: RESOURCE_EXHAUSTED".into())
            }
        }
    }
}

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn plan(entries: &[(&str, &str, u32)]) -> CascadePlan {
    CascadePlan::new(
        entries
            .iter()
            .map(|(m, c, l)| CascadeEntry::new(*m, *c, *l))
            .collect(),
    )
    .unwrap()
}

pub fn credentials(plan: &CascadePlan) -> Vec<Credential> {
    let mut ids: Vec<String> = plan.iter().map(|e| e.credential.clone()).collect();
    ids.sort();
    ids.dedup();
    ids.into_iter()
        .map(|id| Credential::new(id.clone(), Some(format!("secret-{}", id))))
        .collect()
}

pub fn retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(8),
    }
}

/// Controller over an in-memory quota store and a fixed clock
pub fn controller(
    entries: &[(&str, &str, u32)],
    transport: Arc<ScriptedTransport>,
    retry: RetryPolicy,
) -> (CascadeController, Arc<QuotaTracker>, Arc<FixedClock>) {
    let plan = plan(entries);
    let clock = Arc::new(FixedClock::new(day()));
    let quota = Arc::new(QuotaTracker::new(
        &plan,
        Arc::new(MemoryQuotaStore::new()),
        clock.clone(),
    ));
    let credentials = credentials(&plan);
    let controller =
        CascadeController::new(plan, quota.clone(), transport, credentials, retry).unwrap();
    (controller, quota, clock)
}
