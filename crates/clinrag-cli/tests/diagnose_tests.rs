//! Integration tests for summary, quota, diagnose and job commands

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// Nothing listens on the discard port, so every attempt fails to connect
const UNREACHABLE_CONFIG: &str = r#"
llm:
  url: http://127.0.0.1:9
  timeout_secs: 2
credentials:
  - id: primary
    api_key_env: CLINRAG_TEST_API_KEY
cascade:
  entries:
    - model: test-model
      credential: primary
      daily_limit: 5
retry:
  max_attempts: 1
  base_delay_ms: 10
  max_delay_ms: 10
"#;

const PATIENT: &str = r#"
age: 61
sex: M
chief_complaint: Chest pain
symptoms: Crushing chest pain radiating to left arm, diaphoresis
past_medical_history: Hypertension, smoking
vitals:
  blood_pressure_systolic: 165
  blood_pressure_diastolic: 98
  heart_rate: 112
  oxygen_saturation: 93.0
labs: Troponin I 2.1 ng/mL
"#;

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.yml"), UNREACHABLE_CONFIG).unwrap();
        fs::write(dir.path().join("patient.yaml"), PATIENT).unwrap();
        Self { dir }
    }

    fn patient(&self) -> PathBuf {
        self.dir.path().join("patient.yaml")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("clinrag").unwrap();
        cmd.env("CLINRAG_DB", self.dir.path().join("test.sqlite"))
            .env("CLINRAG_TEST_API_KEY", "test-secret")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.dir.path().join("config.yml"));
        cmd
    }
}

#[test]
fn test_summary_renders_sections() {
    let env = Env::new();

    env.cmd()
        .args(["summary", "--patient"])
        .arg(env.patient())
        .assert()
        .success()
        .stdout(predicate::str::contains("Chief Complaint: Chest pain"))
        .stdout(predicate::str::contains("HR 112 bpm (abnormal)"))
        .stdout(predicate::str::contains("Demographics: 61 year old M"))
        .stdout(predicate::str::contains("Fingerprint: "));
}

#[test]
fn test_summary_invalid_patient_file() {
    let env = Env::new();
    let bad = env.dir.path().join("bad.yaml");
    fs::write(&bad, "age: not-a-number\n").unwrap();

    env.cmd()
        .args(["summary", "--patient"])
        .arg(&bad)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("invalid patient file"));
}

#[test]
fn test_quota_lists_configured_entries() {
    let env = Env::new();

    env.cmd()
        .arg("quota")
        .assert()
        .success()
        .stdout(predicate::str::contains("test-model"))
        .stdout(predicate::str::contains("0/5"));
}

#[test]
fn test_diagnose_unreachable_service_is_unavailable() {
    let env = Env::new();
    env.cmd().args(["kb", "load", "--sample"]).assert().success();

    env.cmd()
        .args(["diagnose", "--patient"])
        .arg(env.patient())
        .assert()
        .code(4)
        .stdout(predicate::str::contains("Diagnosis unavailable"))
        .stdout(predicate::str::contains("test-model/primary"));

    // The failed attempt still counted against today's quota
    env.cmd()
        .args(["quota", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 1"));
}

#[test]
fn test_diagnose_json_outcome() {
    let env = Env::new();
    env.cmd().args(["kb", "load", "--sample"]).assert().success();

    let output = env
        .cmd()
        .args(["diagnose", "--format", "json", "--patient"])
        .arg(env.patient())
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["status"], "unavailable");
    assert_eq!(value["outcomes"][0]["state"], "transient_failed");
}

#[test]
fn test_diagnose_without_knowledge_base_skips_generation() {
    let env = Env::new();

    env.cmd()
        .args(["diagnose", "--patient"])
        .arg(env.patient())
        .assert()
        .code(4)
        .stdout(predicate::str::contains("not been built"));

    env.cmd()
        .args(["quota", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 0"));
}

#[test]
fn test_waited_job_fails_with_message() {
    let env = Env::new();
    env.cmd().args(["kb", "load", "--sample"]).assert().success();

    env.cmd()
        .args(["jobs", "submit", "--wait", "--patient"])
        .arg(env.patient())
        .assert()
        .code(4)
        .stdout(predicate::str::contains("FAILED"))
        .stdout(predicate::str::contains("all 1 cascade entries failed"));

    env.cmd()
        .args(["jobs", "list", "--status", "failed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("job-"));
}

#[test]
fn test_queued_job_processed_by_run() {
    let env = Env::new();
    env.cmd().args(["kb", "load", "--sample"]).assert().success();

    let output = env
        .cmd()
        .args(["jobs", "submit", "--format", "json", "--patient"])
        .arg(env.patient())
        .output()
        .unwrap();
    assert!(output.status.success());
    let queued: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(queued["status"], "PENDING");
    let id = queued["id"].as_str().unwrap().to_string();

    env.cmd()
        .args(["jobs", "list", "--status", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()));

    env.cmd()
        .args(["jobs", "run"])
        .assert()
        .success()
        .stdout(predicate::str::contains(id.as_str()))
        .stdout(predicate::str::contains("FAILED"));

    let output = env
        .cmd()
        .args(["jobs", "status", "--format", "json", &id])
        .output()
        .unwrap();
    let job: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(job["status"], "FAILED");
    assert!(job["diagnosis_id"].is_null());
    assert!(job["error_message"]
        .as_str()
        .unwrap()
        .contains("cascade entries failed"));
}

#[test]
fn test_unknown_job_status() {
    let env = Env::new();

    env.cmd()
        .args(["jobs", "status", "job-missing"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Job not found"));
}
