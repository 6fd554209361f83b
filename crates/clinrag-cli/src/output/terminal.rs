//! Terminal output formatter

use clinrag_core::db::CaseStoreInfo;
use clinrag_core::{
    DegradedReason, DiagnosisJob, DiagnosisReport, EntryOutcome, KnowledgeCase, QuotaRecord,
    RetrievalResult, TriageLevel,
};
use std::io::{self, IsTerminal, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout() -> StandardStream {
    let choice = if io::stdout().is_terminal() {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

fn triage_color(level: TriageLevel) -> Color {
    match level {
        TriageLevel::Low => Color::Green,
        TriageLevel::Medium => Color::Yellow,
        TriageLevel::High => Color::Red,
        TriageLevel::Critical => Color::Magenta,
    }
}

pub fn format_cases(cases: &[KnowledgeCase], info: &CaseStoreInfo) -> String {
    if cases.is_empty() {
        return "Knowledge base is empty\n".to_string();
    }

    let mut output = format!(
        "{} cases ({}, {} dimensions)\n",
        info.case_count,
        info.model.as_deref().unwrap_or("unknown model"),
        info.dimensions.unwrap_or(0)
    );
    for case in cases {
        output.push_str(&format!("  {:<12} {}\n", case.id, case.diagnosis));
    }
    output
}

pub fn format_case(case: &KnowledgeCase) -> String {
    let mut output = format!("{}\nDiagnosis: {}\n", case.id, case.diagnosis);
    if let Some(outcome) = &case.outcome {
        output.push_str(&format!("Outcome: {}\n", outcome));
    }
    output.push_str(&format!("\n{}\n", case.narrative));
    output
}

pub fn format_retrieval(result: &RetrievalResult) -> String {
    if result.is_empty() {
        return "No similar cases found\n".to_string();
    }

    let mut output = String::new();
    for case in result.iter() {
        let pct = (case.similarity.max(0.0) * 100.0) as u32;
        output.push_str(&format!(
            "{:>3}% {} {}\n",
            pct, case.case_id, case.diagnosis
        ));
        if let Some(outcome) = &case.outcome {
            output.push_str(&format!("     outcome: {}\n", outcome));
        }
    }
    output
}

pub fn format_quota(records: &[QuotaRecord]) -> String {
    let mut output = format!(
        "{:<28} {:<12} {:>11} {:>10}\n",
        "MODEL", "CREDENTIAL", "USED/LIMIT", "REMAINING"
    );
    for r in records {
        output.push_str(&format!(
            "{:<28} {:<12} {:>11} {:>10}\n",
            r.model,
            r.credential,
            format!("{}/{}", r.count, r.daily_limit),
            r.remaining()
        ));
    }
    output
}

pub fn format_job(job: &DiagnosisJob) -> String {
    let mut output = format!("Job {}: {}\n", job.id, job.status);
    output.push_str(&format!("  Fingerprint: {}\n", job.fingerprint));
    output.push_str(&format!("  Submitted:   {}\n", job.created_at));
    if let Some(id) = &job.diagnosis_id {
        output.push_str(&format!("  Diagnosis:   {}\n", id));
    }
    if let Some(source) = &job.reuse_source {
        output.push_str(&format!("  Reused from: {}\n", source));
    }
    if let Some(message) = &job.error_message {
        output.push_str(&format!("  Error:       {}\n", message));
    }
    output
}

pub fn format_jobs(jobs: &[DiagnosisJob]) -> String {
    if jobs.is_empty() {
        return "No jobs\n".to_string();
    }

    let mut output = String::new();
    for job in jobs {
        let detail = job
            .diagnosis_id
            .as_deref()
            .or(job.error_message.as_deref())
            .unwrap_or("");
        output.push_str(&format!("{:<32} {:<10} {}\n", job.id, job.status, detail));
    }
    output
}

pub fn format_summary(text: &str, fingerprint: &str) -> String {
    format!("{}\n\nFingerprint: {}\n", text, fingerprint)
}

fn degraded_text(reason: &DegradedReason) -> String {
    match reason {
        DegradedReason::NoEvidence => "no similar cases were available as evidence".to_string(),
        DegradedReason::CascadeFallback { skipped_entries } => {
            format!("answered after {} cascade entries failed", skipped_entries)
        }
    }
}

pub fn print_report(report: &DiagnosisReport) -> io::Result<()> {
    let mut out = stdout();
    let result = &report.result;

    write!(out, "Diagnosis {}", result.id)?;
    if let Some(source) = &result.source_result {
        write!(out, " (reused from {})", source)?;
    }
    writeln!(out)?;

    write!(out, "Triage:     ")?;
    out.set_color(
        ColorSpec::new()
            .set_fg(Some(triage_color(result.triage_level)))
            .set_bold(true),
    )?;
    writeln!(out, "{}", result.triage_level)?;
    out.reset()?;
    writeln!(out, "Confidence: {:.0}%", result.confidence_score * 100.0)?;

    writeln!(out)?;
    writeln!(out, "Differential diagnoses:")?;
    for (i, d) in result.differentials.iter().enumerate() {
        writeln!(
            out,
            "  {}. {} ({:.0}%)",
            i + 1,
            d.diagnosis,
            d.confidence * 100.0
        )?;
        writeln!(out, "     {}", d.rationale)?;
    }

    writeln!(out)?;
    writeln!(out, "Explanation:")?;
    writeln!(out, "  {}", result.explanation)?;

    if !result.evidence.is_empty() {
        writeln!(out)?;
        writeln!(out, "Evidence:")?;
        for e in &result.evidence {
            let marker = if e.cited { "*" } else { " " };
            writeln!(
                out,
                " {}{:>3}% {} {}",
                marker,
                (e.similarity.max(0.0) * 100.0) as u32,
                e.case_id,
                e.diagnosis
            )?;
        }
    }

    writeln!(out)?;
    writeln!(
        out,
        "Generated by {} ({}) in {} attempts",
        result.generation.model, result.generation.credential, result.generation.total_attempts
    )?;

    if result.is_degraded() {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
        for reason in &result.degraded {
            writeln!(out, "Degraded: {}", degraded_text(reason))?;
        }
        out.reset()?;
    }

    writeln!(out)?;
    writeln!(out, "{}", result.disclaimer)?;
    Ok(())
}

pub fn print_unavailable(reason: &str, outcomes: &[EntryOutcome]) -> io::Result<()> {
    let mut out = stdout();
    out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    writeln!(out, "Diagnosis unavailable")?;
    out.reset()?;
    writeln!(out, "Reason: {}", reason)?;

    for o in outcomes {
        write!(
            out,
            "  {}/{}: {} after {} attempts",
            o.model, o.credential, o.state, o.attempts
        )?;
        if let Some(err) = &o.last_error {
            write!(out, " ({})", err)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clinrag_core::RetrievedCase;

    #[test]
    fn test_format_retrieval_lists_scores() {
        let result = RetrievalResult {
            cases: vec![RetrievedCase {
                case_id: "MIMIC-001".to_string(),
                narrative: "chest pain".to_string(),
                diagnosis: "Acute Myocardial Infarction".to_string(),
                outcome: None,
                similarity: 0.875,
            }],
            index_version: 1,
        };
        let text = format_retrieval(&result);
        assert_eq!(text, " 87% MIMIC-001 Acute Myocardial Infarction\n");
        assert_eq!(
            format_retrieval(&RetrievalResult::default()),
            "No similar cases found\n"
        );
    }

    #[test]
    fn test_format_quota_shows_remaining() {
        let records = vec![QuotaRecord {
            model: "llama-3.1-8b-instant".to_string(),
            credential: "primary".to_string(),
            day: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            count: 3,
            daily_limit: 10,
        }];
        let text = format_quota(&records);
        assert!(text.contains("3/10"));
        assert!(text.lines().nth(1).unwrap().trim_end().ends_with('7'));
    }
}
