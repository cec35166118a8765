//! CLI contract tests: commands, output shapes, exit codes.
#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn gauntlet() -> Command {
    Command::cargo_bin("gauntlet").unwrap()
}

fn write_case(root: &Path, rel: &str, id: &str, version: &str, script: &str) {
    let dir = root.join("cases").join(rel);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("test.manifest.json"),
        serde_json::to_string_pretty(&json!({"id": id, "version": version, "script": "run.sh"}))
            .unwrap(),
    )
    .unwrap();
    std::fs::write(dir.join("run.sh"), script).unwrap();
}

fn sandbox() -> TempDir {
    let tmp = tempdir().unwrap();
    for dir in ["cases", "suites", "plans", "runs"] {
        std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
    }
    tmp
}

fn root_args(tmp: &TempDir) -> Vec<String> {
    let p = |name: &str| tmp.path().join(name).display().to_string();
    vec![
        "--cases-root".into(),
        p("cases"),
        "--suites-root".into(),
        p("suites"),
        "--plans-root".into(),
        p("plans"),
        "--runs-root".into(),
        p("runs"),
    ]
}

#[test]
fn version_prints_the_package_version() {
    gauntlet()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn discover_reports_counts() {
    let tmp = sandbox();
    write_case(tmp.path(), "demo", "demo", "1.0.0", "exit 0\n");
    gauntlet()
        .arg("discover")
        .args(root_args(&tmp))
        .assert()
        .success()
        .stdout(predicate::str::contains("1 case(s)"))
        .stdout(predicate::str::contains("demo@1.0.0"));
}

#[test]
fn discover_emits_machine_readable_json() {
    let tmp = sandbox();
    write_case(tmp.path(), "demo", "demo", "1.0.0", "exit 0\n");
    let output = gauntlet()
        .arg("discover")
        .args(root_args(&tmp))
        .args(["--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["cases"][0]["id"], "demo");
    assert_eq!(doc["cases"][0]["version"], "1.0.0");
    assert!(doc["errors"].as_array().unwrap().is_empty());
}

#[test]
fn discover_with_duplicates_exits_config_error() {
    let tmp = sandbox();
    write_case(tmp.path(), "a", "dup", "1", "exit 0\n");
    write_case(tmp.path(), "b", "dup", "1", "exit 0\n");
    gauntlet()
        .arg("discover")
        .args(root_args(&tmp))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Identity.Duplicate"));
}

#[test]
fn run_passing_case_exits_zero() {
    let tmp = sandbox();
    write_case(tmp.path(), "demo", "demo", "1.0.0", "echo hello\nexit 0\n");
    gauntlet()
        .arg("run")
        .args(root_args(&tmp))
        .args(["--interpreter", "/bin/sh"])
        .args(["--case", "demo@1.0.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Passed"));

    // The run left an index entry behind.
    let index = std::fs::read_to_string(tmp.path().join("runs/index.jsonl")).unwrap();
    assert_eq!(index.lines().count(), 1);
    assert!(index.contains("\"status\":\"Passed\""));
}

#[test]
fn run_failing_case_exits_one() {
    let tmp = sandbox();
    write_case(tmp.path(), "demo", "demo", "1.0.0", "exit 1\n");
    gauntlet()
        .arg("run")
        .args(root_args(&tmp))
        .args(["--interpreter", "/bin/sh"])
        .args(["--case", "demo@1.0.0"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Failed"));
}

#[test]
fn run_unknown_target_exits_config_error() {
    let tmp = sandbox();
    gauntlet()
        .arg("run")
        .args(root_args(&tmp))
        .args(["--interpreter", "/bin/sh"])
        .args(["--case", "ghost@1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("RunRequest.ResolveFailed"));
}

#[test]
fn run_accepts_a_full_request_document() {
    let tmp = sandbox();
    write_case(
        tmp.path(),
        "echoer",
        "echoer",
        "1",
        "echo \"msg=$2\"\nexit 0\n",
    );
    let dir = tmp.path().join("cases/echoer");
    let manifest = json!({
        "id": "echoer", "version": "1", "script": "run.sh",
        "parameters": [{"name": "msg", "type": "string", "required": true}]
    });
    std::fs::write(
        dir.join("test.manifest.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();

    let request_path = tmp.path().join("request.json");
    std::fs::write(
        &request_path,
        serde_json::to_string(&json!({
            "testCase": "echoer@1",
            "caseInputs": {"msg": "from-request"}
        }))
        .unwrap(),
    )
    .unwrap();

    gauntlet()
        .arg("run")
        .args(root_args(&tmp))
        .args(["--interpreter", "/bin/sh"])
        .args(["--request", request_path.display().to_string().as_str()])
        .assert()
        .success();

    let index = std::fs::read_to_string(tmp.path().join("runs/index.jsonl")).unwrap();
    let entry: serde_json::Value = serde_json::from_str(index.lines().next().unwrap()).unwrap();
    let stdout = std::fs::read_to_string(
        tmp.path()
            .join("runs")
            .join(entry["runId"].as_str().unwrap())
            .join("stdout.log"),
    )
    .unwrap();
    assert!(stdout.contains("msg=from-request"));
}

#[test]
fn run_requires_exactly_one_target() {
    let tmp = sandbox();
    gauntlet()
        .arg("run")
        .args(root_args(&tmp))
        .args(["--case", "a@1", "--suite", "b@1"])
        .assert()
        .failure();
}

#[test]
fn resume_with_unknown_run_id_fails() {
    let tmp = sandbox();
    gauntlet()
        .arg("resume")
        .args(root_args(&tmp))
        .args(["--interpreter", "/bin/sh"])
        .args(["--run-id", "R-doesnotexist", "--token", "deadbeef"])
        .assert()
        .code(2);
}
