//! Integration tests for knowledge base and retrieval commands

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

struct Env {
    dir: TempDir,
}

impl Env {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.yml"), "retrieval:\n  k: 3\n").unwrap();
        Self { dir }
    }

    fn db_path(&self) -> PathBuf {
        self.dir.path().join("test.sqlite")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("clinrag").unwrap();
        cmd.env("CLINRAG_DB", self.db_path())
            .env("CLINRAG_CONFIG", self.dir.path().join("config.yml"))
            .env_remove("RUST_LOG");
        cmd
    }
}

#[test]
fn test_kb_load_sample() {
    let env = Env::new();

    env.cmd()
        .args(["kb", "load", "--sample"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 12 cases"));

    assert!(env.db_path().exists());
}

#[test]
fn test_kb_load_requires_source() {
    let env = Env::new();
    env.cmd().args(["kb", "load"]).assert().failure();
}

#[test]
fn test_kb_load_csv_file() {
    let env = Env::new();
    let csv = env.dir.path().join("cases.csv");
    fs::write(
        &csv,
        "case_id,summary_text,diagnosis,outcome\n\
         C-1,Fever and productive cough with crackles,Community-acquired pneumonia,Recovered\n\
         C-2,Sudden severe headache with neck stiffness,Subarachnoid hemorrhage,\n",
    )
    .unwrap();

    env.cmd()
        .args(["kb", "load"])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 2 cases"));

    env.cmd()
        .args(["kb", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("C-1"))
        .stdout(predicate::str::contains("Subarachnoid hemorrhage"));
}

#[test]
fn test_kb_load_duplicate_ids_is_invalid_input() {
    let env = Env::new();
    let yaml = env.dir.path().join("cases.yaml");
    fs::write(
        &yaml,
        "- id: A\n  narrative: one\n  diagnosis: x\n- id: A\n  narrative: two\n  diagnosis: y\n",
    )
    .unwrap();

    env.cmd()
        .args(["kb", "load"])
        .arg(&yaml)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid input"));
}

#[test]
fn test_kb_list_json() {
    let env = Env::new();
    env.cmd().args(["kb", "load", "--sample"]).assert().success();

    let output = env
        .cmd()
        .args(["kb", "list", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["count"], 12);
    assert_eq!(value["cases"][0]["id"], "MIMIC-001");
}

#[test]
fn test_retrieve_uses_configured_k() {
    let env = Env::new();
    env.cmd().args(["kb", "load", "--sample"]).assert().success();

    let output = env
        .cmd()
        .args([
            "retrieve",
            "crushing chest pain radiating to left arm, diaphoresis",
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let cases = value["cases"].as_array().unwrap();
    assert_eq!(cases.len(), 3);
    assert!(cases[0]["diagnosis"]
        .as_str()
        .unwrap()
        .contains("Myocardial Infarction"));
}

#[test]
fn test_retrieve_cli_output() {
    let env = Env::new();
    env.cmd().args(["kb", "load", "--sample"]).assert().success();

    env.cmd()
        .args(["retrieve", "-k", "1", "chest", "pain", "radiating", "to", "left", "arm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MIMIC-001"))
        .stdout(predicate::str::contains("%"));
}

#[test]
fn test_retrieve_before_load_is_unavailable() {
    let env = Env::new();

    env.cmd()
        .args(["retrieve", "fever"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not been built"));
}

#[test]
fn test_empty_knowledge_base_retrieves_nothing() {
    let env = Env::new();
    let yaml = env.dir.path().join("empty.yaml");
    fs::write(&yaml, "[]\n").unwrap();

    env.cmd()
        .args(["kb", "load"])
        .arg(&yaml)
        .assert()
        .success()
        .stdout(predicate::str::contains("Loaded 0 cases"));

    // A fresh process restores a loaded but empty index, not an unbuilt one
    env.cmd()
        .args(["retrieve", "fever"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No similar cases found"));
}

#[test]
fn test_kb_add_and_show() {
    let env = Env::new();
    env.cmd().args(["kb", "load", "--sample"]).assert().success();

    env.cmd()
        .args([
            "kb",
            "add",
            "--id",
            "LOCAL-001",
            "--diagnosis",
            "Acute angle-closure glaucoma",
            "Sudden painful red eye with halos around lights and vomiting",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added LOCAL-001 (13 cases)"));

    env.cmd()
        .args(["kb", "show", "LOCAL-001"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Diagnosis: Acute angle-closure glaucoma"))
        .stdout(predicate::str::contains("halos around lights"));

    env.cmd()
        .args(["retrieve", "-k", "1", "painful red eye with halos around lights"])
        .assert()
        .success()
        .stdout(predicate::str::contains("LOCAL-001"));
}

#[test]
fn test_kb_add_duplicate_id_is_invalid_input() {
    let env = Env::new();
    env.cmd().args(["kb", "load", "--sample"]).assert().success();

    env.cmd()
        .args(["kb", "add", "--id", "MIMIC-001", "--diagnosis", "x", "some narrative"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("duplicate case id"));
}

#[test]
fn test_kb_show_unknown_case() {
    let env = Env::new();
    env.cmd().args(["kb", "load", "--sample"]).assert().success();

    env.cmd()
        .args(["kb", "show", "NOPE-404"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Case not found"));
}
