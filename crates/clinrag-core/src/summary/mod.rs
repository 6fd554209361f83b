//! Clinical summaries: patient snapshot to text, vector and fingerprint

mod fingerprint;

pub use fingerprint::fingerprint;

use crate::error::Result;
use crate::llm::Embedder;
use serde::{Deserialize, Serialize};

/// Patient presentation as handed over by the record system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSnapshot {
    pub age: u32,
    pub sex: String,
    pub chief_complaint: String,
    pub symptoms: String,
    #[serde(default)]
    pub past_medical_history: Option<String>,
    #[serde(default)]
    pub medications: Option<String>,
    #[serde(default)]
    pub clinical_notes: Option<String>,
    #[serde(default)]
    pub vitals: Option<Vitals>,
    /// Free-text lab results
    #[serde(default)]
    pub labs: Option<String>,
}

/// Vital signs; temperature in °F
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default)]
    pub blood_pressure_systolic: Option<u32>,
    #[serde(default)]
    pub blood_pressure_diastolic: Option<u32>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub respiratory_rate: Option<u32>,
    #[serde(default)]
    pub oxygen_saturation: Option<f32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl Vitals {
    /// Out-of-range readings, rendered for the summary
    pub fn abnormal_findings(&self) -> Vec<String> {
        let mut findings = Vec::new();

        if let (Some(sys), Some(dia)) = (self.blood_pressure_systolic, self.blood_pressure_diastolic)
        {
            if !(90..=140).contains(&sys) || !(60..=90).contains(&dia) {
                findings.push(format!("BP {}/{} mmHg (abnormal)", sys, dia));
            }
        }
        if let Some(hr) = self.heart_rate {
            if !(60..=100).contains(&hr) {
                findings.push(format!("HR {} bpm (abnormal)", hr));
            }
        }
        if let Some(rr) = self.respiratory_rate {
            if !(12..=20).contains(&rr) {
                findings.push(format!("RR {} breaths/min (abnormal)", rr));
            }
        }
        if let Some(spo2) = self.oxygen_saturation {
            if spo2 < 95.0 {
                findings.push(format!("SpO2 {}% (abnormal)", spo2));
            }
        }
        if let Some(temp) = self.temperature {
            if temp > 100.4 || temp < 95.0 {
                findings.push(format!("Temp {}°F (abnormal)", temp));
            }
        }

        findings
    }
}

impl PatientSnapshot {
    /// Canonical summary text used for retrieval and prompting
    pub fn summary_text(&self) -> String {
        let vitals = match &self.vitals {
            Some(vitals) => {
                let findings = vitals.abnormal_findings();
                if findings.is_empty() {
                    "All vitals within normal range".to_string()
                } else {
                    findings.join(", ")
                }
            }
            None => "No vitals recorded".to_string(),
        };

        let labs = non_empty(self.labs.as_deref()).unwrap_or("No labs recorded");
        let history = non_empty(self.past_medical_history.as_deref()).unwrap_or("None reported");
        let medications = non_empty(self.medications.as_deref()).unwrap_or("None reported");

        [
            format!("Chief Complaint: {}", self.chief_complaint),
            format!("Key Symptoms: {}", self.symptoms),
            format!("Abnormal Vitals: {}", vitals),
            format!("Critical Lab Findings: {}", labs),
            format!("Relevant Medical History: {}", history),
            format!("Demographics: {} year old {}", self.age, self.sex),
            format!("Current Medications: {}", medications),
        ]
        .join("\n")
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(self)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Summary text with its encoder output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalSummary {
    pub text: String,
    pub embedding: Vec<f32>,
    /// Fingerprint of the snapshot the text came from, if any
    pub fingerprint: Option<String>,
}

impl ClinicalSummary {
    /// Encode free text
    pub async fn from_text(text: impl Into<String>, embedder: &dyn Embedder) -> Result<Self> {
        let text = text.into();
        let embedding = embedder.embed(&text).await?;
        Ok(Self {
            text,
            embedding,
            fingerprint: None,
        })
    }

    /// Render, fingerprint and encode a patient snapshot
    pub async fn generate(patient: &PatientSnapshot, embedder: &dyn Embedder) -> Result<Self> {
        let mut summary = Self::from_text(patient.summary_text(), embedder).await?;
        summary.fingerprint = Some(patient.fingerprint());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashEmbedder;

    fn patient() -> PatientSnapshot {
        PatientSnapshot {
            age: 67,
            sex: "F".to_string(),
            chief_complaint: "Shortness of breath".to_string(),
            symptoms: "Dyspnea on exertion, orthopnea, leg swelling".to_string(),
            past_medical_history: Some("CHF, atrial fibrillation".to_string()),
            medications: Some("".to_string()),
            clinical_notes: None,
            vitals: Some(Vitals {
                blood_pressure_systolic: Some(150),
                blood_pressure_diastolic: Some(85),
                heart_rate: Some(88),
                respiratory_rate: Some(24),
                oxygen_saturation: Some(91.0),
                temperature: Some(98.2),
            }),
            labs: None,
        }
    }

    #[test]
    fn test_summary_text_sections() {
        let text = patient().summary_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "Chief Complaint: Shortness of breath");
        assert_eq!(
            lines[2],
            "Abnormal Vitals: BP 150/85 mmHg (abnormal), RR 24 breaths/min (abnormal), SpO2 91% (abnormal)"
        );
        assert_eq!(lines[3], "Critical Lab Findings: No labs recorded");
        assert_eq!(lines[5], "Demographics: 67 year old F");
        assert_eq!(lines[6], "Current Medications: None reported");
    }

    #[test]
    fn test_normal_and_missing_vitals() {
        let mut p = patient();
        p.vitals = Some(Vitals {
            heart_rate: Some(72),
            temperature: Some(98.6),
            ..Default::default()
        });
        assert!(p
            .summary_text()
            .contains("Abnormal Vitals: All vitals within normal range"));

        p.vitals = None;
        assert!(p.summary_text().contains("Abnormal Vitals: No vitals recorded"));
    }

    #[tokio::test]
    async fn test_generate_carries_fingerprint() {
        let embedder = HashEmbedder::default();
        let p = patient();
        let summary = ClinicalSummary::generate(&p, &embedder).await.unwrap();
        assert_eq!(summary.embedding.len(), 384);
        assert_eq!(summary.fingerprint.as_deref(), Some(p.fingerprint().as_str()));

        let mut changed = p.clone();
        changed.symptoms = "Fever and productive cough".to_string();
        assert_ne!(summary.fingerprint.as_deref(), Some(changed.fingerprint().as_str()));
    }
}
