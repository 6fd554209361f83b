//! Deterministic case fingerprint
//!
//! Two presentations that differ only in whitespace, letter case or small
//! vital-sign noise hash to the same value.

use super::{PatientSnapshot, Vitals};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

const DEFAULT_STEP: f64 = 5.0;

/// Hex SHA-256 of the normalized presentation
pub fn fingerprint(patient: &PatientSnapshot) -> String {
    // serde_json maps are key-sorted, so serialization is canonical
    let serialized = payload(patient).to_string();
    let digest = Sha256::digest(serialized.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn payload(patient: &PatientSnapshot) -> Value {
    let vitals = patient
        .vitals
        .as_ref()
        .map(vitals_payload)
        .unwrap_or_else(|| json!({}));

    json!({
        "age_bucket": bucket(Some(patient.age as f64), DEFAULT_STEP),
        "sex": patient.sex,
        "chief_complaint": normalize_text(Some(&patient.chief_complaint)),
        "symptoms": normalize_text(Some(&patient.symptoms)),
        "history": normalize_text(patient.past_medical_history.as_deref()),
        "medications": normalize_text(patient.medications.as_deref()),
        "notes": normalize_text(patient.clinical_notes.as_deref()),
        "vitals": vitals,
        "labs": normalize_text(patient.labs.as_deref()),
    })
}

fn vitals_payload(vitals: &Vitals) -> Value {
    json!({
        "bp_sys": bucket(vitals.blood_pressure_systolic.map(f64::from), DEFAULT_STEP),
        "bp_dia": bucket(vitals.blood_pressure_diastolic.map(f64::from), DEFAULT_STEP),
        "heart_rate": bucket(vitals.heart_rate.map(f64::from), DEFAULT_STEP),
        "resp_rate": bucket(vitals.respiratory_rate.map(f64::from), DEFAULT_STEP),
        // tighter tolerance for oxygen saturation and temperature
        "spo2": bucket(vitals.oxygen_saturation.map(f64::from), 1.0),
        "temperature": bucket(vitals.temperature.map(f64::from), 1.0),
    })
}

fn normalize_text(value: Option<&str>) -> String {
    value
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
        .unwrap_or_default()
}

fn bucket(value: Option<f64>, step: f64) -> Option<i64> {
    let value = value.filter(|v| v.is_finite())?;
    Some(((value / step).round_ties_even() * step) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> PatientSnapshot {
        PatientSnapshot {
            age: 54,
            sex: "M".to_string(),
            chief_complaint: "Chest pain".to_string(),
            symptoms: "Crushing chest pain, diaphoresis".to_string(),
            past_medical_history: Some("Hypertension".to_string()),
            medications: None,
            clinical_notes: None,
            vitals: Some(Vitals {
                blood_pressure_systolic: Some(158),
                blood_pressure_diastolic: Some(94),
                heart_rate: Some(108),
                respiratory_rate: Some(22),
                oxygen_saturation: Some(94.0),
                temperature: Some(98.6),
            }),
            labs: Some("Troponin 2.4".to_string()),
        }
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fp = fingerprint(&patient());
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, fingerprint(&patient()));
    }

    #[test]
    fn test_fingerprint_ignores_case_whitespace_and_noise() {
        let mut other = patient();
        other.symptoms = "  crushing   CHEST pain,\tdiaphoresis ".to_string();
        if let Some(v) = other.vitals.as_mut() {
            v.heart_rate = Some(109);
            v.temperature = Some(98.9);
        }
        assert_eq!(fingerprint(&patient()), fingerprint(&other));
    }

    #[test]
    fn test_fingerprint_changes_with_presentation() {
        let mut other = patient();
        other.chief_complaint = "Shortness of breath".to_string();
        assert_ne!(fingerprint(&patient()), fingerprint(&other));

        let mut older = patient();
        older.age = 70;
        assert_ne!(fingerprint(&patient()), fingerprint(&older));
    }

    #[test]
    fn test_bucket_rounding() {
        assert_eq!(bucket(Some(54.0), 5.0), Some(55));
        assert_eq!(bucket(Some(52.0), 5.0), Some(50));
        assert_eq!(bucket(Some(98.6), 1.0), Some(99));
        assert_eq!(bucket(None, 5.0), None);
    }
}
