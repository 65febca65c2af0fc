//! Binary-level tests for behavior that needs no DefectDojo server.

use assert_cmd::Command;
use predicates::prelude::*;

fn dojo_gate() -> Command {
    let mut cmd = Command::cargo_bin("dojo-gate").unwrap();
    cmd.env_remove("DEFECTDOJO_URL")
        .env_remove("DEFECTDOJO_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    dojo_gate()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("import-scan"))
        .stdout(predicate::str::contains("list-environments"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_missing_credentials_fail() {
    dojo_gate()
        .arg("test")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("host not set"));
}

#[test]
fn test_missing_api_key_fails() {
    dojo_gate()
        .args(["--host", "https://dojo.example.com", "check"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("API key not set"));
}

#[test]
fn test_invalid_host_fails() {
    dojo_gate()
        .args(["--host", "not a url", "--api-key", "key", "list-scan-types"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid DefectDojo host"));
}

#[test]
fn test_missing_report_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("zap.xml");

    dojo_gate()
        .args(["--host", "https://dojo.example.com", "--api-key", "key"])
        .args(["import", "--report-file"])
        .arg(&report)
        .args([
            "--scan-type",
            "ZAP Scan",
            "--engagement-id",
            "1",
            "--test-type",
            "ZAP",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Report file not found"));
}

#[test]
fn test_bad_config_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dojo.yaml");
    std::fs::write(&path, "defectdojo:\n  token: abc\n").unwrap();

    dojo_gate()
        .arg("--config")
        .arg(&path)
        .arg("test")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to load config file"));
}

#[test]
fn test_json_errors() {
    dojo_gate()
        .args(["--format", "json", "test"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(r#""error""#));
}
