//! Diagnosis job commands

use super::diagnose::{build_service, log_metrics};
use crate::app::{JobsAction, OutputFormat};
use crate::context::{read_patient, AppContext};
use crate::output::{json, terminal};
use anyhow::Result;
use clinrag_core::error::exit_codes;
use clinrag_core::{DiagnosisJob, JobStatus};
use std::sync::Arc;

/// Returns the process exit code; a waited-on job that fails exits as
/// "diagnosis unavailable"
pub async fn run(action: JobsAction, ctx: &AppContext) -> Result<i32> {
    match action {
        JobsAction::Submit {
            patient,
            fresh,
            wait,
        } => {
            let patient = read_patient(&patient)?;
            if !wait {
                let job = ctx.open_db()?.create_job(&patient, fresh)?;
                print_job(ctx, &job)?;
                return Ok(exit_codes::SUCCESS);
            }

            let (service, transport) = build_service(ctx).await?;
            let service = Arc::new(service);
            let (queued, handle) = service.submit(&patient, fresh)?;
            tracing::info!("Waiting for job {}", queued.id);
            let job = handle.await??;
            log_metrics(&transport);

            print_job(ctx, &job)?;
            Ok(match job.status {
                JobStatus::Failed => exit_codes::DIAGNOSIS_UNAVAILABLE,
                _ => exit_codes::SUCCESS,
            })
        }
        JobsAction::Run => {
            let (service, transport) = build_service(ctx).await?;
            let finished = service.process_pending().await?;
            log_metrics(&transport);
            print_jobs(ctx, &finished)?;
            Ok(exit_codes::SUCCESS)
        }
        JobsAction::Status { id } => {
            let job = ctx.open_db()?.get_job(&id)?;
            print_job(ctx, &job)?;
            Ok(exit_codes::SUCCESS)
        }
        JobsAction::List { status } => {
            let jobs = ctx.open_db()?.list_jobs(status.map(JobStatus::from))?;
            print_jobs(ctx, &jobs)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

fn print_job(ctx: &AppContext, job: &DiagnosisJob) -> Result<()> {
    match ctx.format {
        OutputFormat::Json => json::print(job)?,
        OutputFormat::Cli => print!("{}", terminal::format_job(job)),
    }
    Ok(())
}

fn print_jobs(ctx: &AppContext, jobs: &[DiagnosisJob]) -> Result<()> {
    match ctx.format {
        OutputFormat::Json => json::print(jobs)?,
        OutputFormat::Cli => print!("{}", terminal::format_jobs(jobs)),
    }
    Ok(())
}
