//! Strict decoding of the model's JSON diagnosis

use crate::error::{ClinragError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fewest differentials a usable response may carry
pub const MIN_DIFFERENTIALS: usize = 2;

/// Urgency class, serialized in upper case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriageLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl TriageLevel {
    pub const ALL: [TriageLevel; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriageLevel {
    type Err = ClinragError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ClinragError::MalformedResponse(format!("unknown triage level: {:?}", s)))
    }
}

/// One candidate diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Differential {
    pub diagnosis: String,
    pub confidence: f64,
    pub rationale: String,
}

/// Validated model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedDiagnosis {
    pub differentials: Vec<Differential>,
    pub triage_level: TriageLevel,
    pub explanation: String,
    pub confidence_score: f64,
    pub disclaimer: Option<String>,
}

#[derive(Deserialize)]
struct WireDiagnosis {
    differential_diagnoses: Vec<WireDifferential>,
    triage_level: String,
    explanation: String,
    confidence_score: f64,
    #[serde(default)]
    disclaimer: Option<String>,
}

#[derive(Deserialize)]
struct WireDifferential {
    diagnosis: String,
    confidence: f64,
    #[serde(alias = "reasoning")]
    rationale: String,
}

/// Parses raw completions into [`ParsedDiagnosis`]
#[derive(Debug, Clone)]
pub struct ResponseParser {
    min_differentials: usize,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            min_differentials: MIN_DIFFERENTIALS,
        }
    }

    /// Decode and validate; any violation is `MalformedResponse`
    pub fn parse(&self, raw: &str) -> Result<ParsedDiagnosis> {
        let json = extract_json(raw);
        let wire: WireDiagnosis = serde_json::from_str(json).map_err(|e| {
            tracing::debug!("Response was: {}", raw);
            malformed(format!("invalid diagnosis JSON: {}", e))
        })?;

        if wire.differential_diagnoses.len() < self.min_differentials {
            return Err(malformed(format!(
                "expected at least {} differential diagnoses, got {}",
                self.min_differentials,
                wire.differential_diagnoses.len()
            )));
        }

        let differentials = wire
            .differential_diagnoses
            .into_iter()
            .enumerate()
            .map(|(idx, d)| {
                if d.diagnosis.trim().is_empty() {
                    return Err(malformed(format!("differential {} has an empty label", idx + 1)));
                }
                check_unit_interval(&format!("differential {} confidence", idx + 1), d.confidence)?;
                Ok(Differential {
                    diagnosis: d.diagnosis,
                    confidence: d.confidence,
                    rationale: d.rationale,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        check_unit_interval("confidence_score", wire.confidence_score)?;
        let triage_level = wire.triage_level.parse()?;

        Ok(ParsedDiagnosis {
            differentials,
            triage_level,
            explanation: wire.explanation,
            confidence_score: wire.confidence_score,
            disclaimer: wire.disclaimer.filter(|d| !d.trim().is_empty()),
        })
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

fn malformed(message: String) -> ClinragError {
    ClinragError::MalformedResponse(message)
}

fn check_unit_interval(field: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(malformed(format!("{} out of range [0, 1]: {}", field, value)))
    }
}

/// JSON object text, unwrapped from a Markdown fence or surrounding prose
fn extract_json(response: &str) -> &str {
    let fenced = if response.contains("```json") {
        response
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(response)
    } else if response.contains("```") {
        response
            .split("```")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(response)
    } else {
        response
    }
    .trim();

    match (fenced.find('{'), fenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &fenced[start..=end],
        _ => fenced,
    }
}
