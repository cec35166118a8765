//! Run Folder allocation and artifact writing.
//!
//! A Run Folder is owned by exactly one component from allocation until
//! `result.json` is written; after that it is immutable. Case folders are
//! `R-<32 hex>`, group folders `G-<32 hex>`.

use crate::errors::{EngineError, ErrorKind};
use crate::status::{RunStatus, RunType};
use crate::values::TypedValue;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const SCHEMA_VERSION: u32 = 1;

pub const MANIFEST_JSON: &str = "manifest.json";
pub const PARAMS_JSON: &str = "params.json";
pub const ENV_JSON: &str = "env.json";
pub const STDOUT_LOG: &str = "stdout.log";
pub const STDERR_LOG: &str = "stderr.log";
pub const EVENTS_JSONL: &str = "events.jsonl";
pub const RESULT_JSON: &str = "result.json";
pub const CONTROLS_JSON: &str = "controls.json";
pub const ENVIRONMENT_JSON: &str = "environment.json";
pub const RUN_REQUEST_JSON: &str = "runRequest.json";
pub const CHILDREN_JSONL: &str = "children.jsonl";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const CONTROL_DIR: &str = "control";
pub const SESSION_JSON: &str = "session.json";
pub const REBOOT_JSON: &str = "reboot.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPrefix {
    Case,
    Group,
}

impl RunPrefix {
    fn as_str(&self) -> &'static str {
        match self {
            RunPrefix::Case => "R-",
            RunPrefix::Group => "G-",
        }
    }
}

/// Current wall-clock time in the artifact timestamp format.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone)]
pub struct RunFolder {
    pub run_id: String,
    pub path: PathBuf,
}

impl RunFolder {
    /// Allocate a fresh, unique Run Folder under `runs_root`. On the
    /// (extremely unlikely) id collision a monotonic suffix is appended
    /// until the directory can be created.
    pub fn allocate(runs_root: &Path, prefix: RunPrefix) -> Result<RunFolder, EngineError> {
        std::fs::create_dir_all(runs_root)
            .map_err(|e| EngineError::io(format!("creating {}", runs_root.display()), &e))?;
        let base = format!("{}{}", prefix.as_str(), Uuid::new_v4().simple());
        let mut candidate = base.clone();
        let mut suffix = 0u32;
        loop {
            let path = runs_root.join(&candidate);
            match std::fs::create_dir(&path) {
                Ok(()) => {
                    return Ok(RunFolder {
                        run_id: candidate,
                        path,
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    suffix += 1;
                    candidate = format!("{base}-{suffix}");
                }
                Err(e) => {
                    return Err(EngineError::io(
                        format!("creating run folder {}", path.display()),
                        &e,
                    ))
                }
            }
        }
    }

    /// Open an existing Run Folder, e.g. for resume.
    pub fn open(runs_root: &Path, run_id: &str) -> Result<RunFolder, EngineError> {
        let path = runs_root.join(run_id);
        if !path.is_dir() {
            return Err(EngineError::new(
                ErrorKind::ResumeSessionInvalid,
                format!("run folder '{run_id}' does not exist under {}", runs_root.display()),
            ));
        }
        Ok(RunFolder {
            run_id: run_id.to_string(),
            path,
        })
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.path.join(ARTIFACTS_DIR)
    }

    pub fn control_dir(&self) -> PathBuf {
        self.path.join(CONTROL_DIR)
    }

    pub fn session_path(&self) -> PathBuf {
        self.artifacts_dir().join(SESSION_JSON)
    }

    pub fn reboot_request_path(&self) -> PathBuf {
        self.control_dir().join(REBOOT_JSON)
    }

    /// Create the `artifacts/` and `control/` directories for a case run.
    pub fn prepare_case_dirs(&self) -> Result<(), EngineError> {
        for dir in [self.artifacts_dir(), self.control_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| EngineError::io(format!("creating {}", dir.display()), &e))?;
        }
        Ok(())
    }

    /// Write a pretty-printed JSON artifact.
    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), EngineError> {
        let path = self.file(name);
        let mut text = serde_json::to_string_pretty(value)
            .map_err(|e| EngineError::new(ErrorKind::Internal, e.to_string()))?;
        text.push('\n');
        std::fs::write(&path, text)
            .map_err(|e| EngineError::io(format!("writing {}", path.display()), &e))
    }

    /// Append one minified JSON line to a `.jsonl` artifact.
    pub fn append_jsonl<T: Serialize>(&self, name: &str, value: &T) -> Result<(), EngineError> {
        let path = self.file(name);
        let mut line = serde_json::to_string(value)
            .map_err(|e| EngineError::new(ErrorKind::Internal, e.to_string()))?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| EngineError::io(format!("opening {}", path.display()), &e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| EngineError::io(format!("appending {}", path.display()), &e))
    }

    pub fn is_finalised(&self) -> bool {
        self.file(RESULT_JSON).is_file()
    }

    /// Read `(runId, status)` pairs back out of `children.jsonl`.
    pub fn read_children(&self) -> Result<Vec<(String, RunStatus)>, EngineError> {
        let path = self.file(CHILDREN_JSONL);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io(format!("reading {}", path.display()), &e)),
        };
        let mut children = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
                EngineError::new(ErrorKind::Internal, format!("corrupt children line: {e}"))
            })?;
            let run_id = value
                .get("runId")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let status: RunStatus = serde_json::from_value(
                value.get("status").cloned().unwrap_or_default(),
            )
            .map_err(|e| {
                EngineError::new(ErrorKind::Internal, format!("corrupt children status: {e}"))
            })?;
            children.push((run_id, status));
        }
        Ok(children)
    }
}

/// `result.json` for a case run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub schema_version: u32,
    pub run_type: RunType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub test_id: String,
    pub test_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_version: Option<String>,
    pub status: RunStatus,
    pub start_time: String,
    pub end_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Redacted effective inputs.
    pub effective_inputs: BTreeMap<String, TypedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_count: Option<u32>,
}

/// `result.json` for a suite or plan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResult {
    pub schema_version: u32,
    pub run_type: RunType,
    pub id: String,
    pub version: String,
    pub status: RunStatus,
    pub start_time: String,
    pub end_time: String,
    pub child_run_ids: Vec<String>,
    /// Child counts keyed by status name, ascending.
    pub counts: BTreeMap<String, u32>,
}

impl GroupResult {
    pub fn count_statuses<'a, I: IntoIterator<Item = &'a RunStatus>>(
        statuses: I,
    ) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        for status in statuses {
            *counts.entry(status.as_str().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

/// One line of a suite's `children.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteChildLine {
    pub run_id: String,
    pub node_id: String,
    pub test_id: String,
    pub test_version: String,
    pub status: RunStatus,
}

/// One line of a plan's `children.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanChildLine {
    pub run_id: String,
    pub suite_id: String,
    pub suite_version: String,
    pub status: RunStatus,
}
