//! Reboot-resume control channel.
//!
//! A script requests a machine restart by writing `control/reboot.json` in
//! its run folder before exiting. The schema is strict; any deviation turns
//! the run into an error and the machine is never rebooted. On a valid
//! request the engine persists a resume session, registers an autostart hook
//! through the abstract [`RebootHost`], and asks for the restart.

use crate::errors::{EngineError, ErrorKind};
use crate::status::RunType;
use crate::values::TypedValue;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

pub const REBOOT_REQUEST_TYPE: &str = "control.reboot_required";

/// Strict `control/reboot.json` schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RebootRequest {
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(rename = "nextPhase")]
    pub next_phase: i64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reboot: Option<RebootOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RebootOptions {
    #[serde(rename = "delaySec", default)]
    pub delay_sec: Option<i64>,
}

impl RebootRequest {
    pub fn delay(&self) -> Duration {
        let secs = self
            .reboot
            .as_ref()
            .and_then(|r| r.delay_sec)
            .unwrap_or(0);
        Duration::from_secs(secs.max(0) as u64)
    }
}

/// Read and validate `control/reboot.json`. Absence is `Ok(None)`; any
/// schema violation is a `Reboot.Request.Invalid` error naming the field.
pub fn read_reboot_request(path: &Path) -> Result<Option<RebootRequest>, EngineError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(EngineError::io(format!("reading {}", path.display()), &e)),
    };
    let request: RebootRequest = serde_json::from_str(&text).map_err(|e| {
        EngineError::new(
            ErrorKind::RebootRequestInvalid,
            format!("reboot.json does not match the control schema: {e}"),
        )
        .with_path(path.display().to_string())
    })?;
    if request.request_type != REBOOT_REQUEST_TYPE {
        return Err(invalid(
            path,
            "type",
            format!(
                "expected \"{REBOOT_REQUEST_TYPE}\", got \"{}\"",
                request.request_type
            ),
        ));
    }
    if request.next_phase < 1 {
        return Err(invalid(
            path,
            "nextPhase",
            format!("nextPhase must be >= 1, got {}", request.next_phase),
        ));
    }
    if request.reason.trim().is_empty() {
        return Err(invalid(path, "reason", "reason must be a non-empty string"));
    }
    if let Some(reboot) = &request.reboot {
        if let Some(delay) = reboot.delay_sec {
            if delay < 0 {
                return Err(invalid(
                    path,
                    "reboot.delaySec",
                    format!("delaySec must be >= 0, got {delay}"),
                ));
            }
        }
    }
    Ok(Some(request))
}

fn invalid(path: &Path, field: &str, reason: impl Into<String>) -> EngineError {
    let reason = reason.into();
    EngineError::new(
        ErrorKind::RebootRequestInvalid,
        format!("reboot.json field '{field}': {reason}"),
    )
    .with_path(path.display().to_string())
    .with_field(field)
    .with_reason(reason)
}

/// Fresh cryptographically random resume token.
pub fn new_resume_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    PendingResume,
    Finalized,
}

/// Everything needed to re-enter a suspended case run after a machine
/// restart. Persisted to `<caseRunFolder>/artifacts/session.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeSession {
    pub run_id: String,
    pub entity_type: RunType,
    pub entity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_case_id: Option<String>,
    pub next_phase: u32,
    pub resume_token: String,
    pub resume_count: u32,
    pub state: SessionState,
    pub context: SessionContext,
}

/// Captured execution context: the resolved snapshot of the suspended run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub manifest: Json,
    pub test_id: String,
    pub test_version: String,
    pub script_path: String,
    pub working_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u32>,
    pub environment: BTreeMap<String, String>,
    pub effective_inputs: BTreeMap<String, TypedValue>,
    pub redacted_inputs: BTreeMap<String, TypedValue>,
    pub secret_inputs: BTreeSet<String>,
    pub templates: BTreeMap<String, Json>,
    pub argv: Vec<String>,
    pub start_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_run_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite_start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_run_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_start_time: Option<String>,
}

impl ResumeSession {
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::io(format!("creating {}", parent.display()), &e))?;
        }
        let mut text = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::new(ErrorKind::Internal, e.to_string()))?;
        text.push('\n');
        std::fs::write(path, text)
            .map_err(|e| EngineError::io(format!("writing {}", path.display()), &e))
    }

    pub fn load(path: &Path) -> Result<ResumeSession, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::new(
                ErrorKind::ResumeSessionInvalid,
                format!("cannot read session at {}: {e}", path.display()),
            )
        })?;
        serde_json::from_str(&text).map_err(|e| {
            EngineError::new(
                ErrorKind::ResumeSessionInvalid,
                format!("corrupt session at {}: {e}", path.display()),
            )
        })
    }

    pub fn verify_token(&self, token: &str) -> Result<(), EngineError> {
        if self.resume_token != token {
            return Err(EngineError::new(
                ErrorKind::ResumeSessionInvalid,
                "resume token does not match the persisted session",
            ));
        }
        Ok(())
    }
}

/// Abstract OS surface for reboot-resume. The engine only ever asks for these
/// three things; how they happen (registry run keys, systemd units, …) is the
/// host binary's concern.
pub trait RebootHost: Send + Sync {
    fn register_autostart(
        &self,
        runs_root: &Path,
        run_id: &str,
        token: &str,
    ) -> Result<(), EngineError>;

    fn remove_autostart(&self, run_id: &str) -> Result<(), EngineError>;

    fn request_restart(&self, delay: Duration) -> Result<(), EngineError>;
}

/// Default host: accepts the calls and logs them. Useful wherever an actual
/// restart hook is not wired up (CI, unit tests, dry environments).
#[derive(Debug, Default)]
pub struct NoopRebootHost;

impl RebootHost for NoopRebootHost {
    fn register_autostart(
        &self,
        _runs_root: &Path,
        run_id: &str,
        _token: &str,
    ) -> Result<(), EngineError> {
        tracing::warn!(run_id, "no reboot host wired; autostart registration skipped");
        Ok(())
    }

    fn remove_autostart(&self, run_id: &str) -> Result<(), EngineError> {
        tracing::debug!(run_id, "no reboot host wired; nothing to remove");
        Ok(())
    }

    fn request_restart(&self, delay: Duration) -> Result<(), EngineError> {
        tracing::warn!(?delay, "no reboot host wired; restart request ignored");
        Ok(())
    }
}

/// Test double that records every host interaction.
#[derive(Debug, Default)]
pub struct RecordingRebootHost {
    pub registrations: std::sync::Mutex<Vec<(String, String)>>,
    pub removals: std::sync::Mutex<Vec<String>>,
    pub restarts: std::sync::Mutex<Vec<u64>>,
}

impl RebootHost for RecordingRebootHost {
    fn register_autostart(
        &self,
        _runs_root: &Path,
        run_id: &str,
        token: &str,
    ) -> Result<(), EngineError> {
        self.registrations
            .lock()
            .unwrap()
            .push((run_id.to_string(), token.to_string()));
        Ok(())
    }

    fn remove_autostart(&self, run_id: &str) -> Result<(), EngineError> {
        self.removals.lock().unwrap().push(run_id.to_string());
        Ok(())
    }

    fn request_restart(&self, delay: Duration) -> Result<(), EngineError> {
        self.restarts.lock().unwrap().push(delay.as_secs());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_reboot(dir: &Path, value: serde_json::Value) -> std::path::PathBuf {
        let path = dir.join("reboot.json");
        std::fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();
        path
    }

    #[test]
    fn absent_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_reboot_request(&dir.path().join("reboot.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn valid_request_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reboot(
            dir.path(),
            serde_json::json!({
                "type": "control.reboot_required",
                "nextPhase": 2,
                "reason": "patch",
                "reboot": {"delaySec": 5}
            }),
        );
        let req = read_reboot_request(&path).unwrap().unwrap();
        assert_eq!(req.next_phase, 2);
        assert_eq!(req.delay(), Duration::from_secs(5));
    }

    #[test]
    fn extra_property_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reboot(
            dir.path(),
            serde_json::json!({
                "type": "control.reboot_required",
                "nextPhase": 2,
                "reason": "patch",
                "shutdown": true
            }),
        );
        let err = read_reboot_request(&path).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RebootRequestInvalid);
    }

    #[test]
    fn wrong_type_and_bad_phase_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reboot(
            dir.path(),
            serde_json::json!({"type": "control.shutdown", "nextPhase": 1, "reason": "x"}),
        );
        let err = read_reboot_request(&path).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("type"));

        let path = write_reboot(
            dir.path(),
            serde_json::json!({"type": "control.reboot_required", "nextPhase": 0, "reason": "x"}),
        );
        let err = read_reboot_request(&path).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("nextPhase"));
    }

    #[test]
    fn empty_reason_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reboot(
            dir.path(),
            serde_json::json!({"type": "control.reboot_required", "nextPhase": 1, "reason": "  "}),
        );
        let err = read_reboot_request(&path).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("reason"));
    }

    #[test]
    fn negative_delay_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_reboot(
            dir.path(),
            serde_json::json!({
                "type": "control.reboot_required",
                "nextPhase": 1,
                "reason": "x",
                "reboot": {"delaySec": -1}
            }),
        );
        let err = read_reboot_request(&path).unwrap_err();
        assert_eq!(err.field.as_deref(), Some("reboot.delaySec"));
    }

    #[test]
    fn tokens_are_long_random_hex() {
        let a = new_resume_token();
        let b = new_resume_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_round_trips_and_verifies_token() {
        let dir = tempfile::tempdir().unwrap();
        let session = ResumeSession {
            run_id: "R-abc".into(),
            entity_type: RunType::TestCase,
            entity_id: "demo@1".into(),
            current_case_id: Some("demo@1".into()),
            next_phase: 2,
            resume_token: new_resume_token(),
            resume_count: 1,
            state: SessionState::PendingResume,
            context: SessionContext {
                manifest: serde_json::json!({"id": "demo", "version": "1"}),
                test_id: "demo".into(),
                test_version: "1".into(),
                script_path: "/cases/demo/run.sh".into(),
                working_dir: "/cases/demo".into(),
                timeout_sec: None,
                environment: BTreeMap::new(),
                effective_inputs: BTreeMap::new(),
                redacted_inputs: BTreeMap::new(),
                secret_inputs: BTreeSet::new(),
                templates: BTreeMap::new(),
                argv: vec!["/cases/demo/run.sh".into()],
                start_time: "2026-01-01T00:00:00.000Z".into(),
                node_id: None,
                suite_id: None,
                suite_version: None,
                plan_id: None,
                plan_version: None,
                suite_run_id: None,
                suite_run_folder: None,
                suite_start_time: None,
                plan_run_id: None,
                plan_run_folder: None,
                plan_start_time: None,
            },
        };
        let path = dir.path().join("artifacts").join("session.json");
        session.save(&path).unwrap();
        let back = ResumeSession::load(&path).unwrap();
        assert_eq!(back.run_id, "R-abc");
        assert_eq!(back.state, SessionState::PendingResume);
        back.verify_token(&session.resume_token).unwrap();
        assert!(back.verify_token("wrong").is_err());
    }
}
