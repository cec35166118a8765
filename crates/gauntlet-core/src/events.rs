//! Typed run events, appended to a run folder's `events.jsonl`.

use crate::errors::EngineError;
use crate::status::{RunStatus, RunType};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warning,
}

/// One event payload. The serialized `type` strings are part of the artifact
/// contract.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum EventKind {
    #[serde(rename = "run.started")]
    RunStarted {
        #[serde(rename = "runType")]
        run_type: RunType,
        id: String,
        version: String,
        #[serde(rename = "nodeId", skip_serializing_if = "Option::is_none")]
        node_id: Option<String>,
    },
    #[serde(rename = "process.spawned")]
    ProcessSpawned {
        #[serde(skip_serializing_if = "Option::is_none")]
        pid: Option<u32>,
    },
    #[serde(rename = "process.exited")]
    ProcessExited {
        #[serde(rename = "exitCode")]
        exit_code: i32,
    },
    #[serde(rename = "process.timeout")]
    ProcessTimeout {
        #[serde(rename = "timeoutSec")]
        timeout_sec: u64,
    },
    #[serde(rename = "process.aborted")]
    ProcessAborted,
    #[serde(rename = "Controls.MaxParallel.Ignored")]
    MaxParallelIgnored { declared: u32 },
    #[serde(rename = "EnvRef.SecretOnCommandLine")]
    SecretOnCommandLine { parameter: String },
    #[serde(rename = "reboot.requested")]
    RebootRequested {
        #[serde(rename = "nextPhase")]
        next_phase: u32,
        reason: String,
        #[serde(rename = "delaySec")]
        delay_sec: u64,
    },
    #[serde(rename = "resume.reentered")]
    ResumeReentered {
        #[serde(rename = "resumeCount")]
        resume_count: u32,
    },
    #[serde(rename = "node.finished")]
    NodeFinished {
        #[serde(rename = "nodeId")]
        node_id: String,
        #[serde(rename = "runId")]
        run_id: String,
        status: RunStatus,
    },
}

impl EventKind {
    fn level(&self) -> EventLevel {
        match self {
            EventKind::MaxParallelIgnored { .. } | EventKind::SecretOnCommandLine { .. } => {
                EventLevel::Warning
            }
            _ => EventLevel::Info,
        }
    }
}

#[derive(Debug, Serialize)]
struct Event<'a> {
    ts: String,
    level: EventLevel,
    #[serde(flatten)]
    kind: &'a EventKind,
}

/// Append-only writer over a run folder's `events.jsonl`. Owned by exactly
/// one component for the lifetime of the run.
#[derive(Debug)]
pub struct EventWriter {
    file: std::fs::File,
}

impl EventWriter {
    pub fn create(path: &Path) -> Result<EventWriter, EngineError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| EngineError::io(format!("opening {}", path.display()), &e))?;
        Ok(EventWriter { file })
    }

    pub fn emit(&mut self, kind: EventKind) -> Result<(), EngineError> {
        let event = Event {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: kind.level(),
            kind: &kind,
        };
        let mut line = serde_json::to_string(&event)
            .map_err(|e| EngineError::new(crate::errors::ErrorKind::Internal, e.to_string()))?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .map_err(|e| EngineError::io("appending events.jsonl", &e))?;
        Ok(())
    }
}
