//! Generation request construction

use crate::config::LLMServiceConfig;
use crate::llm::GenerationRequest;
use crate::retrieval::{RetrievalResult, RetrievedCase};

const NO_EVIDENCE: &str = "No similar cases found in the knowledge base.";

const SYSTEM_PROMPT: &str = r#"You are an emergency clinical decision support assistant. Your role is to provide differential diagnosis suggestions based on evidence from similar historical cases.

CRITICAL SAFETY REQUIREMENTS:
- You must NEVER provide a single definitive diagnosis
- Always provide differential diagnoses (multiple possibilities)
- Always express uncertainty and acknowledge limitations
- Ground your reasoning only in the patient summary and the retrieved cases supplied, and reference those cases explicitly
- This is decision support only, NOT a replacement for clinical judgment"#;

const OUTPUT_SCHEMA: &str = r#"{
  "differential_diagnoses": [
    {
      "diagnosis": "condition name",
      "confidence": decimal (0.0-1.0),
      "rationale": "brief explanation referencing similar cases"
    }
  ],
  "triage_level": "LOW | MEDIUM | HIGH | CRITICAL",
  "explanation": "Medical reasoning explaining the differential diagnoses and triage level, with explicit references to the retrieved cases that support it",
  "confidence_score": decimal (0.0-1.0),
  "disclaimer": "This is clinical decision support only. Final diagnosis and treatment decisions must be made by qualified healthcare professionals based on complete clinical assessment."
}"#;

/// Renders summary and evidence into a [`GenerationRequest`]
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    temperature: f32,
    max_tokens: u32,
}

impl PromptBuilder {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }

    pub fn from_config(config: &LLMServiceConfig) -> Self {
        Self::new(config.temperature, config.max_tokens)
    }

    pub fn build(&self, summary: &str, evidence: &RetrievalResult) -> GenerationRequest {
        let user = format!(
            r#"PATIENT CLINICAL SUMMARY:
{summary}

RETRIEVED SIMILAR CASES FROM KNOWLEDGE BASE:
{cases}

REQUIRED OUTPUT FORMAT (JSON):
{schema}

INSTRUCTIONS:
1. Analyze the patient summary and retrieved cases
2. Generate 3-5 differential diagnoses ranked by confidence (never fewer than 2)
3. Use explicit uncertainty language in every rationale
4. Assign a triage level of exactly one of LOW, MEDIUM, HIGH, CRITICAL
5. Provide an explanation referencing the retrieved cases by ID
6. Include a confidence score reflecting certainty of the assessment
7. Output ONLY valid JSON matching the format above"#,
            summary = summary.trim(),
            cases = format_evidence(evidence),
            schema = OUTPUT_SCHEMA,
        );

        GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            user,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::from_config(&LLMServiceConfig::default())
    }
}

fn format_evidence(evidence: &RetrievalResult) -> String {
    if evidence.is_empty() {
        return NO_EVIDENCE.to_string();
    }

    evidence
        .iter()
        .enumerate()
        .map(|(idx, case)| format_case(idx + 1, case))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_case(number: usize, case: &RetrievedCase) -> String {
    let mut text = format!(
        "CASE {} (ID: {}, similarity {:.3}):\nSummary: {}\nDiagnosis: {}\n",
        number, case.case_id, case.similarity, case.narrative, case.diagnosis
    );
    if let Some(outcome) = &case.outcome {
        text.push_str(&format!("Outcome: {}\n", outcome));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evidence() -> RetrievalResult {
        RetrievalResult {
            cases: vec![
                RetrievedCase {
                    case_id: "MIMIC-001".to_string(),
                    narrative: "Chest pain radiating to left arm".to_string(),
                    diagnosis: "Acute Myocardial Infarction".to_string(),
                    outcome: Some("Admitted to CCU".to_string()),
                    similarity: 0.91234,
                },
                RetrievedCase {
                    case_id: "MIMIC-004".to_string(),
                    narrative: "Sudden dyspnea after flight".to_string(),
                    diagnosis: "Pulmonary Embolism".to_string(),
                    outcome: None,
                    similarity: 0.5,
                },
            ],
            index_version: 1,
        }
    }

    #[test]
    fn test_evidence_rendered_in_order() {
        let request = PromptBuilder::new(0.2, 512).build("Chief Complaint: Chest pain", &evidence());

        let first = request.user.find("CASE 1 (ID: MIMIC-001, similarity 0.912)").unwrap();
        let second = request.user.find("CASE 2 (ID: MIMIC-004, similarity 0.500)").unwrap();
        assert!(first < second);
        assert!(request.user.contains("Outcome: Admitted to CCU"));
        assert!(request.user.contains("Diagnosis: Pulmonary Embolism"));
        assert!(!request.user.contains(NO_EVIDENCE));
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.max_tokens, 512);
    }

    #[test]
    fn test_empty_evidence_is_explicit() {
        let request = PromptBuilder::default().build("summary", &RetrievalResult::default());
        assert!(request.user.contains(NO_EVIDENCE));
        assert!(request.user.contains("\"differential_diagnoses\""));
        assert!(request.system.contains("NEVER provide a single definitive diagnosis"));
    }

    #[test]
    fn test_deterministic() {
        let builder = PromptBuilder::default();
        assert_eq!(builder.build("s", &evidence()), builder.build("s", &evidence()));
    }
}
