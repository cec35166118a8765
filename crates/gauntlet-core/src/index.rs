//! The global run index: `<runsRoot>/index.jsonl`.
//!
//! One minified JSON line per finalised run, appended after the run's
//! `result.json` is written. Appends are serialised by a process-local mutex
//! so concurrent executors in the same process never interleave lines.

use crate::errors::EngineError;
use crate::status::{RunStatus, RunType};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub run_id: String,
    pub run_type: RunType,
    pub id: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub status: RunStatus,
}

#[derive(Debug)]
pub struct RunIndex {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RunIndex {
    pub fn new(runs_root: &Path) -> RunIndex {
        RunIndex {
            path: runs_root.join("index.jsonl"),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &IndexEntry) -> Result<(), EngineError> {
        let mut line = serde_json::to_string(entry)
            .map_err(|e| EngineError::new(crate::errors::ErrorKind::Internal, e.to_string()))?;
        line.push('\n');
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::io(format!("opening {}", self.path.display()), &e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| EngineError::io("appending index.jsonl", &e))?;
        Ok(())
    }

    /// Read every entry back, skipping blank lines. Used by tests and the CLI.
    pub fn read_all(&self) -> Result<Vec<IndexEntry>, EngineError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(EngineError::io("reading index.jsonl", &e)),
        };
        let mut entries = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let entry = serde_json::from_str(line).map_err(|e| {
                EngineError::new(
                    crate::errors::ErrorKind::Internal,
                    format!("corrupt index line: {e}"),
                )
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(run_id: &str) -> IndexEntry {
        IndexEntry {
            run_id: run_id.into(),
            run_type: RunType::TestCase,
            id: "demo".into(),
            version: "1.0.0".into(),
            node_id: None,
            parent_run_id: None,
            start_time: "2026-01-01T00:00:00.000Z".into(),
            end_time: "2026-01-01T00:00:01.000Z".into(),
            status: RunStatus::Passed,
        }
    }

    #[test]
    fn appends_one_minified_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let index = RunIndex::new(dir.path());
        index.append(&entry("R-1")).unwrap();
        index.append(&entry("R-2")).unwrap();
        let text = std::fs::read_to_string(index.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(!text.contains("  "), "index lines must be minified");
        assert!(text.ends_with('\n'));
        let back = index.read_all().unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1].run_id, "R-2");
    }

    #[test]
    fn optional_fields_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let index = RunIndex::new(dir.path());
        index.append(&entry("R-1")).unwrap();
        let text = std::fs::read_to_string(index.path()).unwrap();
        assert!(!text.contains("nodeId"));
        assert!(!text.contains("parentRunId"));
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = RunIndex::new(dir.path());
        assert!(index.read_all().unwrap().is_empty());
    }
}
