//! Shared fixtures: a sandbox with the four roots and `sh`-scripted cases.
#![allow(dead_code)]

use gauntlet_core::{Engine, EngineOptions};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct Sandbox {
    pub tmp: TempDir,
}

impl Sandbox {
    pub fn new() -> Sandbox {
        let tmp = tempfile::tempdir().unwrap();
        for dir in ["cases", "suites", "plans", "runs"] {
            std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        Sandbox { tmp }
    }

    pub fn root(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    pub fn runs_root(&self) -> PathBuf {
        self.root("runs")
    }

    /// Write a case manifest plus its `run.sh` under `cases/<rel>/`.
    pub fn write_case(&self, rel: &str, manifest: Value, script: &str) {
        let dir = self.root("cases").join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("test.manifest.json"),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.join("run.sh"), script).unwrap();
    }

    pub fn write_suite(&self, rel: &str, manifest: Value) {
        let dir = self.root("suites").join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("suite.manifest.json"),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
    }

    pub fn write_plan(&self, rel: &str, manifest: Value) {
        let dir = self.root("plans").join(rel);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("plan.manifest.json"),
            serde_json::to_string_pretty(&manifest).unwrap(),
        )
        .unwrap();
    }

    pub fn options(&self) -> EngineOptions {
        EngineOptions {
            cases_root: self.root("cases"),
            suites_root: self.root("suites"),
            plans_root: self.root("plans"),
            runs_root: self.runs_root(),
            interpreter: PathBuf::from("/bin/sh"),
            interpreter_args: Vec::new(),
            engine_version: "0.0.0-test".to_string(),
            script_host_version: None,
        }
    }

    pub fn engine(&self) -> Engine {
        Engine::new(self.options())
    }

    pub fn read_json(path: &Path) -> Value {
        let text = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
        serde_json::from_str(&text).unwrap()
    }

    pub fn index_lines(&self) -> Vec<Value> {
        let path = self.runs_root().join("index.jsonl");
        let text = std::fs::read_to_string(path).unwrap_or_default();
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    pub fn children_lines(folder: &Path) -> Vec<Value> {
        let text = std::fs::read_to_string(folder.join("children.jsonl")).unwrap_or_default();
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    pub fn events(folder: &Path) -> Vec<Value> {
        let text = std::fs::read_to_string(folder.join("events.jsonl")).unwrap_or_default();
        text.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }
}

/// A minimal manifest for a case with no parameters.
pub fn simple_case(id: &str, version: &str) -> Value {
    serde_json::json!({"id": id, "version": version, "script": "run.sh"})
}
