//! Caller-facing diagnosis pipeline
//!
//! summary → retrieval → prompt → cascade (with parsing as validation) →
//! assembled result, optionally reusing a stored result for an identical
//! case fingerprint.
//!
//! Requests can also be queued as jobs and worked off by tokio tasks. A job
//! moves PENDING → PROCESSING → COMPLETED or FAILED and keeps the result id,
//! the reused source result and the failure message.

use crate::cascade::{CascadeController, EntryOutcome};
use crate::clock::Clock;
use crate::config::Config;
use crate::db::{Database, DiagnosisJob, JobStatus};
use crate::diagnosis::{DiagnosisAssembler, DiagnosisResult};
use crate::error::{ClinragError, Result};
use crate::index::VectorIndex;
use crate::llm::{Embedder, GenerationTransport};
use crate::parser::ResponseParser;
use crate::prompt::PromptBuilder;
use crate::quota::{QuotaStore, QuotaTracker};
use crate::retrieval::{CaseRetriever, RetrievalResult};
use crate::summary::{ClinicalSummary, PatientSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Successful diagnosis with the evidence it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisReport {
    pub result: DiagnosisResult,
    pub retrieval: RetrievalResult,
}

/// Either a report or an explicit "diagnosis unavailable"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiagnosisOutcome {
    Available(Box<DiagnosisReport>),
    Unavailable {
        reason: String,
        outcomes: Vec<EntryOutcome>,
    },
}

impl DiagnosisOutcome {
    /// Fold "unavailable" failures into the outcome; local faults stay errors
    pub fn from_result(result: Result<DiagnosisReport>) -> Result<Self> {
        match result {
            Ok(report) => Ok(Self::Available(Box::new(report))),
            Err(e) => match e.unavailable_reason() {
                Some(reason) => Ok(Self::Unavailable {
                    reason,
                    outcomes: e.outcomes().to_vec(),
                }),
                None => Err(e),
            },
        }
    }
}

/// Retrieval parameters used per request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub k: usize,
    pub min_similarity: f32,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            k: 5,
            min_similarity: 0.0,
        }
    }
}

pub struct DiagnosisService {
    retriever: CaseRetriever,
    cascade: CascadeController,
    prompt: PromptBuilder,
    parser: ResponseParser,
    assembler: DiagnosisAssembler,
    params: RetrievalParams,
    deadline: Option<Duration>,
    results: Option<Arc<Mutex<Database>>>,
}

impl DiagnosisService {
    pub fn new(retriever: CaseRetriever, cascade: CascadeController) -> Self {
        Self {
            retriever,
            cascade,
            prompt: PromptBuilder::default(),
            parser: ResponseParser::new(),
            assembler: DiagnosisAssembler::default(),
            params: RetrievalParams::default(),
            deadline: None,
            results: None,
        }
    }

    /// Wire every component from configuration
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        transport: Arc<dyn GenerationTransport>,
        quota_store: Arc<dyn QuotaStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let plan = config.cascade_plan()?;
        let quota = Arc::new(QuotaTracker::new(&plan, quota_store, clock));
        let cascade = CascadeController::new(
            plan,
            quota,
            transport,
            config.resolve_credentials(),
            config.retry_policy(),
        )?
        .with_attempt_timeout(config.llm.attempt_timeout());

        Ok(Self::new(CaseRetriever::new(embedder, index), cascade)
            .with_prompt_builder(PromptBuilder::from_config(&config.llm))
            .with_assembler(DiagnosisAssembler::new(config.degraded_skip_threshold))
            .with_retrieval(RetrievalParams {
                k: config.retrieval.k,
                min_similarity: config.retrieval.min_similarity,
            })
            .with_deadline(config.deadline()))
    }

    pub fn with_prompt_builder(mut self, prompt: PromptBuilder) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_assembler(mut self, assembler: DiagnosisAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_retrieval(mut self, params: RetrievalParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Persist results and reuse them for identical fingerprints
    pub fn with_result_store(mut self, db: Arc<Mutex<Database>>) -> Self {
        self.results = Some(db);
        self
    }

    pub fn quota(&self) -> &QuotaTracker {
        self.cascade.quota()
    }

    pub fn retriever(&self) -> &CaseRetriever {
        &self.retriever
    }

    /// Diagnose an encoded summary. Never returns a partial result.
    pub async fn diagnose(&self, summary: &ClinicalSummary) -> Result<DiagnosisReport> {
        let deadline = self.deadline.map(|d| Instant::now() + d);

        let retrieval =
            self.retriever
                .retrieve(summary, self.params.k, self.params.min_similarity)?;
        if retrieval.is_empty() {
            tracing::warn!("No evidence retrieved, generating without similar cases");
        }

        let request = self.prompt.build(&summary.text, &retrieval);
        let success = self
            .cascade
            .execute(&request, deadline, |raw| self.parser.parse(raw))
            .await?;

        let result = self.assembler.assemble(
            success.value,
            &retrieval,
            success.metadata,
            summary.fingerprint.clone(),
        );
        if result.is_degraded() {
            tracing::warn!("Diagnosis {} is degraded: {:?}", result.id, result.degraded);
        }

        let report = DiagnosisReport { result, retrieval };
        self.store(&report)?;
        Ok(report)
    }

    /// Diagnose a patient snapshot, reusing a stored result unless `fresh`
    pub async fn diagnose_patient(
        &self,
        patient: &PatientSnapshot,
        fresh: bool,
    ) -> Result<DiagnosisReport> {
        if !fresh {
            if let Some(report) = self.lookup(&patient.fingerprint())? {
                tracing::info!(
                    "Reusing stored diagnosis {} as {}",
                    report.result.source_result.as_deref().unwrap_or_default(),
                    report.result.id
                );
                return Ok(report);
            }
        }

        let summary = ClinicalSummary::generate(patient, self.retriever.embedder().as_ref()).await?;
        self.diagnose(&summary).await
    }

    /// [`Self::diagnose_patient`] with unavailability as a value
    pub async fn try_diagnose_patient(
        &self,
        patient: &PatientSnapshot,
        fresh: bool,
    ) -> Result<DiagnosisOutcome> {
        DiagnosisOutcome::from_result(self.diagnose_patient(patient, fresh).await)
    }

    /// Copy the latest stored result for `fingerprint` into a new result
    /// that records where it came from
    fn lookup(&self, fingerprint: &str) -> Result<Option<DiagnosisReport>> {
        let Some(db) = &self.results else {
            return Ok(None);
        };
        let stored = lock(db)?.latest_diagnosis(fingerprint)?;
        let Some(stored) = stored else {
            return Ok(None);
        };

        let source: DiagnosisReport = serde_json::from_str(&stored.payload)?;
        let report = DiagnosisReport {
            result: self.assembler.reuse(&source.result),
            retrieval: source.retrieval,
        };
        self.store(&report)?;
        Ok(Some(report))
    }

    fn store(&self, report: &DiagnosisReport) -> Result<()> {
        let Some(db) = &self.results else {
            return Ok(());
        };
        let payload = serde_json::to_string(report)?;
        lock(db)?.save_diagnosis(
            &report.result.id,
            report.result.fingerprint.as_deref(),
            report.result.source_result.as_deref(),
            &payload,
        )
    }

    /// Stored report for a result id
    pub fn stored_report(&self, id: &str) -> Result<DiagnosisReport> {
        let stored = lock(self.job_store()?)?.get_diagnosis(id)?;
        Ok(serde_json::from_str(&stored.payload)?)
    }

    fn job_store(&self) -> Result<&Mutex<Database>> {
        self.results.as_deref().ok_or_else(|| {
            ClinragError::Config("diagnosis jobs need a result store".to_string())
        })
    }

    /// Queue a diagnosis request as a pending job
    pub fn enqueue(&self, patient: &PatientSnapshot, fresh: bool) -> Result<DiagnosisJob> {
        let job = lock(self.job_store()?)?.create_job(patient, fresh)?;
        tracing::info!("Queued diagnosis job {}", job.id);
        Ok(job)
    }

    /// Work off one job on a tokio task
    pub fn spawn_job(self: &Arc<Self>, id: &str) -> JoinHandle<Result<DiagnosisJob>> {
        let service = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move { service.process_job(&id).await })
    }

    /// Queue a request and start working on it in the background
    pub fn submit(
        self: &Arc<Self>,
        patient: &PatientSnapshot,
        fresh: bool,
    ) -> Result<(DiagnosisJob, JoinHandle<Result<DiagnosisJob>>)> {
        let job = self.enqueue(patient, fresh)?;
        let handle = self.spawn_job(&job.id);
        Ok((job, handle))
    }

    /// Run a pending job to a terminal state.
    ///
    /// Pipeline failures end the job as FAILED with the error message and
    /// are not returned. Only storage faults and unknown ids are errors. A
    /// job that is not pending is returned unchanged.
    pub async fn process_job(&self, id: &str) -> Result<DiagnosisJob> {
        let store = self.job_store()?;
        let claimed = lock(store)?.claim_job(id)?;
        let job = lock(store)?.get_job(id)?;
        if !claimed {
            tracing::debug!("Job {} is {}, not processing", id, job.status);
            return Ok(job);
        }

        tracing::info!("Processing diagnosis job {}", id);
        let outcome = self.diagnose_patient(&job.patient, job.fresh).await;

        match outcome {
            Ok(report) => {
                let result = &report.result;
                lock(store)?.complete_job(id, &result.id, result.source_result.as_deref())?;
                tracing::info!("Job {} completed with {}", id, result.id);
            }
            Err(e) => {
                let message = e.unavailable_reason().unwrap_or_else(|| e.to_string());
                tracing::warn!("Job {} failed: {}", id, message);
                lock(store)?.fail_job(id, &message)?;
            }
        }

        let job = lock(store)?.get_job(id)?;
        Ok(job)
    }

    /// Process every pending job in submission order
    pub async fn process_pending(&self) -> Result<Vec<DiagnosisJob>> {
        let pending = lock(self.job_store()?)?.list_jobs(Some(JobStatus::Pending))?;
        let mut finished = Vec::with_capacity(pending.len());
        for job in pending {
            finished.push(self.process_job(&job.id).await?);
        }
        Ok(finished)
    }

    pub fn job(&self, id: &str) -> Result<DiagnosisJob> {
        lock(self.job_store()?)?.get_job(id)
    }

    pub fn jobs(&self, status: Option<JobStatus>) -> Result<Vec<DiagnosisJob>> {
        lock(self.job_store()?)?.list_jobs(status)
    }
}

fn lock(db: &Mutex<Database>) -> Result<std::sync::MutexGuard<'_, Database>> {
    db.lock()
        .map_err(|e| ClinragError::Other(anyhow::anyhow!("database lock poisoned: {}", e)))
}
