//! Summary command

use crate::app::{OutputFormat, SummaryArgs};
use crate::context::{read_patient, AppContext};
use crate::output::{json, terminal};
use anyhow::Result;

pub fn run(args: SummaryArgs, ctx: &AppContext) -> Result<()> {
    let patient = read_patient(&args.patient)?;
    let text = patient.summary_text();
    let fingerprint = patient.fingerprint();

    match ctx.format {
        OutputFormat::Json => json::print(&serde_json::json!({
            "summary": text,
            "fingerprint": fingerprint,
            "abnormal_vitals": patient
                .vitals
                .as_ref()
                .map(|v| v.abnormal_findings())
                .unwrap_or_default(),
        }))?,
        OutputFormat::Cli => print!("{}", terminal::format_summary(&text, &fingerprint)),
    }
    Ok(())
}
