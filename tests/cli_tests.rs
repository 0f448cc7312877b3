//! CLI tests for the `modtrace` demo binary
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn modtrace() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("modtrace").expect("binary built")
}

#[test]
fn test_cli_help() {
    modtrace()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_default_run_traces_root_only() {
    modtrace()
        .assert()
        .success()
        .stdout(predicate::str::contains("numlib.array"))
        .stdout(predicate::str::contains("numlib.matmul"))
        .stdout(predicate::str::contains("numlib.transpose"))
        .stdout(predicate::str::contains("--- trace: numlib (4 calls) ---"))
        .stdout(predicate::str::contains("numlib.linalg").not());
}

#[test]
fn test_submodules_include_linalg() {
    modtrace()
        .arg("--submodules")
        .assert()
        .success()
        .stdout(predicate::str::contains("numlib.linalg.det"))
        .stdout(predicate::str::contains("numlib.linalg.inv"))
        .stdout(predicate::str::contains("(6 calls)"));
}

#[test]
fn test_quiet_suppresses_echo() {
    let output = modtrace().arg("--quiet").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("--- trace:"));
}

#[test]
fn test_json_output_is_parseable() {
    let output = modtrace()
        .args(["--format", "json", "--submodules"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["format"], "modtrace-json-v1");
    assert_eq!(value["unit"], "numlib");
    assert_eq!(value["summary"]["total_calls"], 6);
    assert!(value["summary"].get("calls_per_unit").is_none());
    assert_eq!(value["calls"][3]["unit"], "numlib.linalg");
    assert_eq!(value["calls"][4]["unit"], "numlib.linalg");
    assert_eq!(value["calls"][0]["callable"], "array");
    assert_eq!(value["calls"][5]["kwargs"]["a"].as_array().unwrap().len(), 2);
}

#[test]
fn test_csv_output() {
    modtrace()
        .args(["--format", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sequence,unit,callable,args,kwargs\n"))
        .stdout(predicate::str::contains("2,numlib,matmul,"));
}

#[test]
fn test_trace_subunit_directly() {
    modtrace()
        .args(["--unit", "numlib.linalg", "--quiet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(1 calls)"))
        .stdout(predicate::str::contains("numlib.linalg.det"));
}

#[test]
fn test_unknown_unit_fails() {
    modtrace()
        .args(["--unit", "nosuchunit"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unit not found in registry: nosuchunit"));
}

#[test]
fn test_config_file_enables_submodules() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "trace_submodules = true").unwrap();
    file.flush().unwrap();

    modtrace()
        .arg("--config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("numlib.linalg.inv"));
}

#[test]
fn test_config_denylist_hides_linalg() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "trace_submodules = true\ndenylist = [\"linalg\"]").unwrap();
    file.flush().unwrap();

    modtrace()
        .arg("--config")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("numlib.linalg").not())
        .stdout(predicate::str::contains("(4 calls)"));
}

#[test]
fn test_invalid_config_fails() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "trace_submodules = \"maybe\"").unwrap();
    file.flush().unwrap();

    modtrace()
        .arg("--config")
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_debug_logs_to_stderr() {
    let output = modtrace().args(["--debug", "--quiet"]).output().unwrap();
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("session active") || stderr.contains("DEBUG"),
        "No tracing output found in stderr: {}",
        stderr
    );
}
