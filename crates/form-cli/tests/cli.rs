use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::str::contains;
use serde_json::Value;

const LOG_ENV: &str = "FORM_WIZARD_LOG";

const QUICK_SCHEMA: &str = r#"{
    "id": "quick", "title": "Quick check",
    "sections": [
        { "id": 1, "name": "Start", "questions": [
            { "id": "ready", "type": "single-choice", "text": "Ready?",
              "options": [{ "label": "Yes" }, { "label": "No" }],
              "jump": [{ "trigger": "Yes", "target": "end" }] }
        ]}
    ]
}"#;

fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../form-spec/tests/fixtures/household.json")
}

fn wizard() -> Command {
    let mut command = Command::cargo_bin("form-wizard").expect("binary exists");
    command.env_remove(LOG_ENV).env_remove("RUST_LOG");
    command
}

#[test]
fn validate_accepts_household_fixture() {
    wizard()
        .args(["validate", "--schema"])
        .arg(fixture_path())
        .assert()
        .success()
        .stdout(contains("Validation result: valid"));
}

#[test]
fn validate_rejects_broken_schema() {
    let dir = assert_fs::TempDir::new().unwrap();
    let schema = dir.child("broken.json");
    schema
        .write_str(r#"{ "id": "broken", "title": "Broken", "sections": [] }"#)
        .unwrap();
    wizard()
        .args(["validate", "--schema"])
        .arg(schema.path())
        .assert()
        .failure()
        .stdout(contains("no_sections"));
}

#[test]
fn controls_lists_generated_names() {
    let output = wizard()
        .args(["controls", "--schema"])
        .arg(fixture_path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("favorite_color, favorite_color_selected"));
    assert!(stdout.contains("ready [single-choice] section 4: ready_to_submit"));
    assert!(stdout.contains("hidden fields: net_total, tax_ratio, has_pension"));
}

#[test]
fn json_schema_describes_sections() {
    let output = wizard().arg("json-schema").output().unwrap();
    assert!(output.status.success());
    let schema: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(schema["properties"]["sections"].is_object());
}

#[test]
fn wizard_finishes_on_end_jump() {
    let dir = tempfile::TempDir::new().unwrap();
    let schema = dir.path().join("quick.json");
    fs::write(&schema, QUICK_SCHEMA).unwrap();
    let output = wizard()
        .args(["wizard", "--values-json", "--schema"])
        .arg(&schema)
        .write_stdin("maybe\nyes\n")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Form: Quick check"));
    assert!(stdout.contains("== Section 1/1: Start"));
    assert!(stdout.contains("Form complete."));
    assert!(stdout.contains("Values (CBOR hex): "));
    assert!(stdout.contains("\"ready\": \"Yes\""));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Invalid answer"));
}

#[test]
fn wizard_fails_when_input_closes() {
    let dir = tempfile::TempDir::new().unwrap();
    let schema = dir.path().join("quick.json");
    fs::write(&schema, QUICK_SCHEMA).unwrap();
    wizard()
        .args(["wizard", "--schema"])
        .arg(&schema)
        .write_stdin("")
        .assert()
        .failure();
}
