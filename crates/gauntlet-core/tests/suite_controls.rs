//! Suite execution semantics: ordering, retries, continue-on-failure,
//! repeat, and the ignored-parallelism warning.
#![cfg(unix)]

mod common;

use common::{simple_case, Sandbox};
use gauntlet_core::{ErrorKind, RunOutcome, RunRequest, RunStatus};
use serde_json::json;

fn group(outcome: RunOutcome) -> gauntlet_core::RunSummary {
    match outcome {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::Suspended { run_id } => panic!("unexpected suspension of {run_id}"),
    }
}

fn three_case_suite(sb: &Sandbox, controls: serde_json::Value) {
    sb.write_case("a", simple_case("case-a", "1"), "exit 0\n");
    // Exit 2 is a script error, which is what retryOnError retries.
    sb.write_case("b", simple_case("case-b", "1"), "exit 2\n");
    sb.write_case("c", simple_case("case-c", "1"), "exit 0\n");
    sb.write_suite(
        "smoke",
        json!({
            "id": "smoke", "version": "2.0",
            "testCases": [
                {"nodeId": "A", "ref": "a"},
                {"nodeId": "B", "ref": "b"},
                {"nodeId": "C", "ref": "c"}
            ],
            "controls": controls
        }),
    );
}

#[tokio::test]
async fn retry_on_error_then_stop_on_failure() {
    let sb = Sandbox::new();
    three_case_suite(&sb, json!({"retryOnError": 1, "continueOnFailure": false}));

    let summary = group(
        sb.engine()
            .run(&RunRequest::for_suite("smoke@2.0"))
            .await
            .unwrap(),
    );
    assert_eq!(summary.status, RunStatus::Error);
    assert!(summary.run_id.starts_with("G-"));

    let children = Sandbox::children_lines(&summary.run_folder);
    // A once, B twice (retried), C never started.
    assert_eq!(children.len(), 3);
    assert_eq!(children[0]["nodeId"], "A");
    assert_eq!(children[0]["status"], "Passed");
    assert_eq!(children[1]["nodeId"], "B");
    assert_eq!(children[1]["status"], "Error");
    assert_eq!(children[2]["nodeId"], "B");
    assert_eq!(children[2]["status"], "Error");
    assert_ne!(children[1]["runId"], children[2]["runId"]);
    assert!(!children.iter().any(|c| c["nodeId"] == "C"));

    let result = Sandbox::read_json(&summary.run_folder.join("result.json"));
    assert_eq!(result["runType"], "TestSuite");
    assert_eq!(result["status"], "Error");
    assert_eq!(result["childRunIds"].as_array().unwrap().len(), 3);
    assert_eq!(result["counts"]["Error"], 2);
    assert_eq!(result["counts"]["Passed"], 1);

    // Each attempt is indexed; the suite entry is their parent.
    let index = sb.index_lines();
    let case_entries: Vec<_> = index.iter().filter(|e| e["runType"] == "TestCase").collect();
    assert_eq!(case_entries.len(), 3);
    for entry in &case_entries {
        assert_eq!(entry["parentRunId"], summary.run_id.as_str());
    }
    let suite_entry = index
        .iter()
        .find(|e| e["runType"] == "TestSuite")
        .expect("suite index entry");
    assert_eq!(suite_entry["runId"], summary.run_id.as_str());
    assert_eq!(suite_entry["status"], "Error");
}

#[tokio::test]
async fn continue_on_failure_runs_every_node() {
    let sb = Sandbox::new();
    sb.write_case("a", simple_case("case-a", "1"), "exit 0\n");
    sb.write_case("b", simple_case("case-b", "1"), "exit 1\n");
    sb.write_case("c", simple_case("case-c", "1"), "exit 0\n");
    sb.write_suite(
        "smoke",
        json!({
            "id": "smoke", "version": "1",
            "testCases": [
                {"nodeId": "A", "ref": "a"},
                {"nodeId": "B", "ref": "b"},
                {"nodeId": "C", "ref": "c"}
            ],
            "controls": {"continueOnFailure": true}
        }),
    );
    let summary = group(
        sb.engine()
            .run(&RunRequest::for_suite("smoke@1"))
            .await
            .unwrap(),
    );
    assert_eq!(summary.status, RunStatus::Failed);
    let children = Sandbox::children_lines(&summary.run_folder);
    assert_eq!(children.len(), 3);
    assert_eq!(children[2]["nodeId"], "C");
}

#[tokio::test]
async fn failed_is_not_retryable() {
    let sb = Sandbox::new();
    sb.write_case("b", simple_case("case-b", "1"), "exit 1\n");
    sb.write_suite(
        "solo",
        json!({
            "id": "solo", "version": "1",
            "testCases": [{"nodeId": "B", "ref": "b"}],
            "controls": {"retryOnError": 3}
        }),
    );
    let summary = group(
        sb.engine()
            .run(&RunRequest::for_suite("solo@1"))
            .await
            .unwrap(),
    );
    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(Sandbox::children_lines(&summary.run_folder).len(), 1);
}

#[tokio::test]
async fn repeat_iterates_the_node_list() {
    let sb = Sandbox::new();
    sb.write_case("a", simple_case("case-a", "1"), "exit 0\n");
    sb.write_suite(
        "rep",
        json!({
            "id": "rep", "version": "1",
            "testCases": [{"nodeId": "A", "ref": "a"}],
            "controls": {"repeat": 3}
        }),
    );
    let summary = group(
        sb.engine()
            .run(&RunRequest::for_suite("rep@1"))
            .await
            .unwrap(),
    );
    assert_eq!(summary.status, RunStatus::Passed);
    assert_eq!(Sandbox::children_lines(&summary.run_folder).len(), 3);
}

#[tokio::test]
async fn max_parallel_is_ignored_with_a_warning() {
    let sb = Sandbox::new();
    sb.write_case("a", simple_case("case-a", "1"), "exit 0\n");
    sb.write_suite(
        "par",
        json!({
            "id": "par", "version": "1",
            "testCases": [{"nodeId": "A", "ref": "a"}],
            "controls": {"maxParallel": 8}
        }),
    );
    let summary = group(
        sb.engine()
            .run(&RunRequest::for_suite("par@1"))
            .await
            .unwrap(),
    );
    let events = Sandbox::events(&summary.run_folder);
    let warning = events
        .iter()
        .find(|e| e["type"] == "Controls.MaxParallel.Ignored")
        .expect("maxParallel warning");
    assert_eq!(warning["declared"], 8);
    assert_eq!(warning["level"], "warning");
}

#[tokio::test]
async fn node_override_for_unknown_node_is_rejected() {
    let sb = Sandbox::new();
    sb.write_case("a", simple_case("case-a", "1"), "exit 0\n");
    sb.write_suite(
        "s",
        json!({"id": "s", "version": "1", "testCases": [{"nodeId": "A", "ref": "a"}]}),
    );
    let mut request = RunRequest::for_suite("s@1");
    request.node_overrides = Some(
        [(
            "Z".to_string(),
            gauntlet_core::request::NodeOverride::default(),
        )]
        .into_iter()
        .collect(),
    );
    let err = sb.engine().run(&request).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RunRequestInvalid);
    assert_eq!(err.node_id.as_deref(), Some("Z"));
}

#[tokio::test]
async fn node_ids_match_case_sensitively() {
    let sb = Sandbox::new();
    sb.write_case("a", simple_case("case-a", "1"), "exit 0\n");
    sb.write_suite(
        "s",
        json!({"id": "s", "version": "1", "testCases": [{"nodeId": "A", "ref": "a"}]}),
    );
    let mut request = RunRequest::for_suite("s@1");
    // Lowercase "a" does not name the declared node "A".
    request.node_overrides = Some(
        [(
            "a".to_string(),
            gauntlet_core::request::NodeOverride::default(),
        )]
        .into_iter()
        .collect(),
    );
    let err = sb.engine().run(&request).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RunRequestInvalid);
}

#[tokio::test]
async fn overrides_win_over_node_inputs() {
    let sb = Sandbox::new();
    sb.write_case(
        "echoer",
        json!({
            "id": "echoer", "version": "1", "script": "run.sh",
            "parameters": [{"name": "msg", "type": "string", "default": "default"}]
        }),
        "echo \"msg=$2\"\nexit 0\n",
    );
    sb.write_suite(
        "s",
        json!({
            "id": "s", "version": "1",
            "testCases": [{"nodeId": "A", "ref": "echoer", "inputs": {"msg": "from-node"}}]
        }),
    );
    let mut request = RunRequest::for_suite("s@1");
    request.node_overrides = Some(
        [(
            "A".to_string(),
            gauntlet_core::request::NodeOverride {
                inputs: [("msg".to_string(), json!("from-request"))]
                    .into_iter()
                    .collect(),
            },
        )]
        .into_iter()
        .collect(),
    );
    let summary = group(sb.engine().run(&request).await.unwrap());
    assert_eq!(summary.status, RunStatus::Passed);
    let children = Sandbox::children_lines(&summary.run_folder);
    let child_run = children[0]["runId"].as_str().unwrap();
    let stdout =
        std::fs::read_to_string(sb.runs_root().join(child_run).join("stdout.log")).unwrap();
    assert!(stdout.contains("msg=from-request"));
}

#[tokio::test]
async fn missing_working_dir_fails_the_node_before_launch() {
    let sb = Sandbox::new();
    sb.write_case("a", simple_case("case-a", "1"), "echo ran\nexit 0\n");
    sb.write_suite(
        "s",
        json!({
            "id": "s", "version": "1",
            "testCases": [{"nodeId": "A", "ref": "a"}],
            "environment": {"workingDir": "does-not-exist"}
        }),
    );
    let summary = group(
        sb.engine()
            .run(&RunRequest::for_suite("s@1"))
            .await
            .unwrap(),
    );
    assert_eq!(summary.status, RunStatus::Error);
    let children = Sandbox::children_lines(&summary.run_folder);
    let child_run = children[0]["runId"].as_str().unwrap();
    let result = Sandbox::read_json(&sb.runs_root().join(child_run).join("result.json"));
    assert_eq!(result["error"]["type"], "Runner.WorkingDir.Invalid");
}

#[tokio::test]
async fn escaping_ref_becomes_an_error_child() {
    let sb = Sandbox::new();
    sb.write_case("a", simple_case("case-a", "1"), "exit 0\n");
    sb.write_suite(
        "s",
        json!({
            "id": "s", "version": "1",
            "testCases": [{"nodeId": "X", "ref": "../../outside"}]
        }),
    );
    let summary = group(
        sb.engine()
            .run(&RunRequest::for_suite("s@1"))
            .await
            .unwrap(),
    );
    assert_eq!(summary.status, RunStatus::Error);
    let children = Sandbox::children_lines(&summary.run_folder);
    assert_eq!(children.len(), 1);
    let child_run = children[0]["runId"].as_str().unwrap();
    let result = Sandbox::read_json(&sb.runs_root().join(child_run).join("result.json"));
    assert_eq!(result["error"]["type"], "Suite.TestCaseRef.Invalid");
    assert_eq!(result["error"]["reason"], "OutOfRoot");
}
