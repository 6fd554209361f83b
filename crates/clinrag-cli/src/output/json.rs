//! JSON output formatter

use anyhow::Result;
use clinrag_core::db::CaseStoreInfo;
use clinrag_core::KnowledgeCase;
use serde::Serialize;

pub fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// One stored case without its vector
pub fn format_case(case: &KnowledgeCase) -> serde_json::Value {
    serde_json::json!({
        "id": case.id,
        "diagnosis": case.diagnosis,
        "outcome": case.outcome,
        "narrative": case.narrative,
    })
}

/// Stored cases without their vectors
pub fn format_cases(cases: &[KnowledgeCase], info: &CaseStoreInfo) -> serde_json::Value {
    let cases: Vec<serde_json::Value> = cases.iter().map(format_case).collect();

    serde_json::json!({
        "model": info.model,
        "dimensions": info.dimensions,
        "count": info.case_count,
        "cases": cases,
    })
}
