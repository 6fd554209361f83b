//! Diagnose command

use crate::app::{DiagnoseArgs, OutputFormat};
use crate::context::{read_patient, AppContext};
use crate::output::{json, terminal};
use anyhow::Result;
use clinrag_core::error::exit_codes;
use clinrag_core::{DiagnosisOutcome, DiagnosisService, HttpTransport, SqliteQuotaStore, SystemClock};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fully wired service backed by the configured database, plus the
/// transport so request metrics can be reported afterwards
pub async fn build_service(ctx: &AppContext) -> Result<(DiagnosisService, Arc<HttpTransport>)> {
    let db = ctx.open_db()?;
    let embedder = ctx.embedder()?;
    let index = ctx.restore_index(&db, embedder.as_ref()).await?;

    let transport = Arc::new(HttpTransport::new(ctx.config.llm.clone())?);
    let quota_store = Arc::new(SqliteQuotaStore::open(&ctx.db_path)?);

    let service = DiagnosisService::from_config(
        &ctx.config,
        embedder,
        index,
        transport.clone(),
        quota_store,
        Arc::new(SystemClock),
    )?
    .with_result_store(Arc::new(Mutex::new(db)));
    Ok((service, transport))
}

pub fn log_metrics(transport: &HttpTransport) {
    let metrics = transport.metrics();
    if metrics.total_requests > 0 {
        tracing::info!(
            "Generation requests: {} ({} quota, {} transient, {} permanent errors), avg {:.0}ms",
            metrics.total_requests,
            metrics.quota_errors,
            metrics.transient_errors,
            metrics.permanent_errors,
            metrics.avg_latency_ms
        );
    }
}

/// Returns the process exit code: unavailability is an outcome, not an error
pub async fn run(args: DiagnoseArgs, ctx: &AppContext) -> Result<i32> {
    let patient = read_patient(&args.patient)?;

    let (mut service, transport) = build_service(ctx).await?;
    if let Some(secs) = args.deadline {
        service = service.with_deadline(Some(Duration::from_secs(secs)));
    }

    let outcome = service.try_diagnose_patient(&patient, args.fresh).await?;
    log_metrics(&transport);

    match ctx.format {
        OutputFormat::Json => json::print(&outcome)?,
        OutputFormat::Cli => match &outcome {
            DiagnosisOutcome::Available(report) => terminal::print_report(report)?,
            DiagnosisOutcome::Unavailable { reason, outcomes } => {
                terminal::print_unavailable(reason, outcomes)?
            }
        },
    }

    Ok(match outcome {
        DiagnosisOutcome::Available(_) => exit_codes::SUCCESS,
        DiagnosisOutcome::Unavailable { .. } => exit_codes::DIAGNOSIS_UNAVAILABLE,
    })
}
