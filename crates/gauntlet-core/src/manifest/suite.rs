//! Suite manifest (`suite.manifest.json`).

use super::field_err;
use crate::errors::{EngineError, ErrorKind};
use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// One test-case reference inside a suite.
#[derive(Debug, Clone)]
pub struct SuiteNode {
    pub node_id: String,
    /// Directory path relative to the Cases root.
    pub ref_path: String,
    pub inputs: Option<BTreeMap<String, Json>>,
}

#[derive(Debug, Clone, Default)]
pub struct SuiteEnvironment {
    pub env: Option<BTreeMap<String, String>>,
    pub working_dir: Option<String>,
}

/// The only accepted timeout policy. Anything else fails manifest validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimeoutPolicy {
    #[default]
    AbortOnTimeout,
}

/// Suite execution controls with their contract defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuiteControls {
    pub repeat: u32,
    pub max_parallel: u32,
    pub continue_on_failure: bool,
    pub retry_on_error: u32,
    pub timeout_policy: TimeoutPolicy,
}

impl Default for SuiteControls {
    fn default() -> Self {
        Self {
            repeat: 1,
            max_parallel: 1,
            continue_on_failure: false,
            retry_on_error: 0,
            timeout_policy: TimeoutPolicy::AbortOnTimeout,
        }
    }
}

/// Validated suite manifest.
#[derive(Debug, Clone)]
pub struct SuiteManifest {
    pub identity: Identity,
    pub test_cases: Vec<SuiteNode>,
    pub environment: SuiteEnvironment,
    pub controls: SuiteControls,
}

impl SuiteManifest {
    pub fn node_ids(&self) -> BTreeSet<&str> {
        self.test_cases.iter().map(|n| n.node_id.as_str()).collect()
    }

    pub fn from_raw(path: &Path, raw: &Json) -> Result<SuiteManifest, EngineError> {
        let doc: RawSuite = serde_json::from_value(raw.clone())
            .map_err(|e| field_err(path, "", e.to_string()))?;

        let identity = Identity::from_fields(&doc.id, &doc.version)
            .map_err(|e| e.with_path(path.display().to_string()))?;

        let mut seen = BTreeSet::new();
        let mut test_cases = Vec::with_capacity(doc.test_cases.len());
        for node in doc.test_cases {
            if node.node_id.is_empty() {
                return Err(field_err(path, "testCases", "nodeId must be non-empty"));
            }
            if !seen.insert(node.node_id.clone()) {
                return Err(EngineError::new(
                    ErrorKind::SuiteNodeIdDuplicate,
                    format!("duplicate nodeId '{}'", node.node_id),
                )
                .with_path(path.display().to_string())
                .with_node_id(node.node_id));
            }
            if node.ref_path.is_empty() {
                return Err(field_err(
                    path,
                    "testCases",
                    format!("node '{}' has an empty ref", node.node_id),
                ));
            }
            test_cases.push(SuiteNode {
                node_id: node.node_id,
                ref_path: node.ref_path,
                inputs: node.inputs,
            });
        }

        let environment = match doc.environment {
            Some(env) => {
                if let Some(map) = &env.env {
                    if map.keys().any(|k| k.is_empty()) {
                        return Err(EngineError::new(
                            ErrorKind::SuiteEnvironmentInvalid,
                            "environment keys must be non-empty",
                        )
                        .with_path(path.display().to_string()));
                    }
                }
                SuiteEnvironment {
                    env: env.env,
                    working_dir: env.working_dir,
                }
            }
            None => SuiteEnvironment::default(),
        };

        let controls = match doc.controls {
            Some(raw) => parse_controls(path, raw)?,
            None => SuiteControls::default(),
        };

        Ok(SuiteManifest {
            identity,
            test_cases,
            environment,
            controls,
        })
    }
}

fn parse_controls(path: &Path, raw: RawControls) -> Result<SuiteControls, EngineError> {
    let defaults = SuiteControls::default();
    let repeat = raw.repeat.unwrap_or(defaults.repeat as i64);
    if repeat < 1 {
        return Err(field_err(
            path,
            "controls.repeat",
            format!("repeat must be >= 1, got {repeat}"),
        ));
    }
    let max_parallel = raw.max_parallel.unwrap_or(defaults.max_parallel as i64);
    if max_parallel < 1 {
        return Err(field_err(
            path,
            "controls.maxParallel",
            format!("maxParallel must be >= 1, got {max_parallel}"),
        ));
    }
    let retry_on_error = raw.retry_on_error.unwrap_or(0);
    if retry_on_error < 0 {
        return Err(field_err(
            path,
            "controls.retryOnError",
            format!("retryOnError must be >= 0, got {retry_on_error}"),
        ));
    }
    let timeout_policy = match raw.timeout_policy.as_deref() {
        None | Some("AbortOnTimeout") => TimeoutPolicy::AbortOnTimeout,
        Some(other) => {
            return Err(field_err(
                path,
                "controls.timeoutPolicy",
                format!("unsupported timeoutPolicy '{other}'"),
            ))
        }
    };
    Ok(SuiteControls {
        repeat: repeat as u32,
        max_parallel: max_parallel as u32,
        continue_on_failure: raw.continue_on_failure.unwrap_or(false),
        retry_on_error: retry_on_error as u32,
        timeout_policy,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSuite {
    id: String,
    version: String,
    #[serde(default)]
    test_cases: Vec<RawNode>,
    #[serde(default)]
    environment: Option<RawSuiteEnvironment>,
    #[serde(default)]
    controls: Option<RawControls>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    node_id: String,
    #[serde(rename = "ref")]
    ref_path: String,
    #[serde(default)]
    inputs: Option<BTreeMap<String, Json>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSuiteEnvironment {
    #[serde(default)]
    env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    working_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawControls {
    #[serde(default)]
    repeat: Option<i64>,
    #[serde(default)]
    max_parallel: Option<i64>,
    #[serde(default)]
    continue_on_failure: Option<bool>,
    #[serde(default)]
    retry_on_error: Option<i64>,
    #[serde(default)]
    timeout_policy: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: Json) -> Result<SuiteManifest, EngineError> {
        SuiteManifest::from_raw(Path::new("suite.manifest.json"), &raw)
    }

    #[test]
    fn defaults_apply_when_controls_absent() {
        let m = parse(json!({
            "id": "smoke", "version": "2.0",
            "testCases": [{"nodeId": "a", "ref": "net/ping"}]
        }))
        .unwrap();
        assert_eq!(m.controls.repeat, 1);
        assert_eq!(m.controls.max_parallel, 1);
        assert!(!m.controls.continue_on_failure);
        assert_eq!(m.controls.retry_on_error, 0);
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let err = parse(json!({
            "id": "s", "version": "1",
            "testCases": [
                {"nodeId": "a", "ref": "x"},
                {"nodeId": "a", "ref": "y"}
            ]
        }))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SuiteNodeIdDuplicate);
    }

    #[test]
    fn node_ids_are_case_sensitive() {
        let m = parse(json!({
            "id": "s", "version": "1",
            "testCases": [
                {"nodeId": "a", "ref": "x"},
                {"nodeId": "A", "ref": "y"}
            ]
        }))
        .unwrap();
        assert_eq!(m.test_cases.len(), 2);
    }

    #[test]
    fn unknown_timeout_policy_is_rejected() {
        let err = parse(json!({
            "id": "s", "version": "1",
            "testCases": [],
            "controls": {"timeoutPolicy": "KeepRunning"}
        }))
        .unwrap_err();
        assert!(err.message.contains("timeoutPolicy"));
    }

    #[test]
    fn zero_repeat_is_rejected() {
        let err = parse(json!({
            "id": "s", "version": "1",
            "testCases": [],
            "controls": {"repeat": 0}
        }))
        .unwrap_err();
        assert!(err.message.contains("repeat"));
    }

    #[test]
    fn empty_env_key_is_rejected() {
        let err = parse(json!({
            "id": "s", "version": "1",
            "testCases": [],
            "environment": {"env": {"": "x"}}
        }))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SuiteEnvironmentInvalid);
    }

    #[test]
    fn controls_serialize_camel_case() {
        let text = serde_json::to_string(&SuiteControls::default()).unwrap();
        assert!(text.contains("continueOnFailure"));
        assert!(text.contains("AbortOnTimeout"));
    }
}
