//! Structured engine errors.
//!
//! Every failure the engine can surface carries a stable, machine-readable
//! code (`ErrorKind::code`) plus optional structured context. The code strings
//! are part of the artifact contract: they appear verbatim in `result.json`
//! error payloads and in CLI output.

use crate::status::RunType;
use serde_json::json;
use thiserror::Error;

/// Fine-grained error taxonomy. One variant per contract error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    IdentityInvalid,
    IdentityDuplicate,
    ManifestInvalid,
    PlanEnvironmentInvalid,
    SuiteEnvironmentInvalid,
    SuiteNodeIdDuplicate,
    SuiteTestCaseRefInvalid,
    PlanSuiteRefInvalid,
    PlanSuiteRefNotFound,
    PlanSuiteRefNonUnique,
    RunRequestInvalid,
    RunRequestResolveFailed,
    InputsUnknown,
    InputsRequiredMissing,
    InputsTypeInvalid,
    InputsEnumInvalid,
    EnvRefResolveFailed,
    EnvironmentInvalidKey,
    WorkingDirInvalid,
    InputPathInvalid,
    InputFileMissing,
    InputFolderMissing,
    RebootRequestInvalid,
    ResumeSessionInvalid,
    Io,
    Internal,
}

impl ErrorKind {
    /// Stable dotted code string written into artifacts.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::IdentityInvalid => "Identity.Invalid",
            ErrorKind::IdentityDuplicate => "Identity.Duplicate",
            ErrorKind::ManifestInvalid => "Manifest.Invalid",
            ErrorKind::PlanEnvironmentInvalid => "Plan.Environment.Invalid",
            ErrorKind::SuiteEnvironmentInvalid => "Suite.Environment.Invalid",
            ErrorKind::SuiteNodeIdDuplicate => "Suite.NodeId.Duplicate",
            ErrorKind::SuiteTestCaseRefInvalid => "Suite.TestCaseRef.Invalid",
            ErrorKind::PlanSuiteRefInvalid => "Plan.SuiteRef.Invalid",
            ErrorKind::PlanSuiteRefNotFound => "Plan.SuiteRef.NotFound",
            ErrorKind::PlanSuiteRefNonUnique => "Plan.SuiteRef.NonUnique",
            ErrorKind::RunRequestInvalid => "RunRequest.Invalid",
            ErrorKind::RunRequestResolveFailed => "RunRequest.ResolveFailed",
            ErrorKind::InputsUnknown => "Inputs.Unknown",
            ErrorKind::InputsRequiredMissing => "Inputs.RequiredMissing",
            ErrorKind::InputsTypeInvalid => "Inputs.TypeInvalid",
            ErrorKind::InputsEnumInvalid => "Inputs.Enum.Invalid",
            ErrorKind::EnvRefResolveFailed => "EnvRef.ResolveFailed",
            ErrorKind::EnvironmentInvalidKey => "Environment.InvalidKey",
            ErrorKind::WorkingDirInvalid => "Runner.WorkingDir.Invalid",
            ErrorKind::InputPathInvalid => "Runner.Input.Path.Invalid",
            ErrorKind::InputFileMissing => "Runner.Input.File.Missing",
            ErrorKind::InputFolderMissing => "Runner.Input.Folder.Missing",
            ErrorKind::RebootRequestInvalid => "Reboot.Request.Invalid",
            ErrorKind::ResumeSessionInvalid => "Resume.Session.Invalid",
            ErrorKind::Io => "Runner.Io",
            ErrorKind::Internal => "Runner.Internal",
        }
    }

    /// True for errors caused by the caller's request or the authored
    /// manifests, as opposed to engine/host failures.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ErrorKind::Io | ErrorKind::Internal)
    }
}

/// Engine error with structured context.
#[derive(Debug, Clone, Error)]
#[error("{}: {}", .kind.code(), .message)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    pub path: Option<String>,
    pub entity_type: Option<RunType>,
    pub id: Option<String>,
    pub version: Option<String>,
    pub field: Option<String>,
    pub reason: Option<String>,
    pub env: Option<String>,
    pub parameter: Option<String>,
    pub node_id: Option<String>,
    pub conflict_paths: Vec<String>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            path: None,
            entity_type: None,
            id: None,
            version: None,
            field: None,
            reason: None,
            env: None,
            parameter: None,
            node_id: None,
            conflict_paths: Vec::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_entity_type(mut self, entity_type: RunType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    pub fn with_identity(mut self, id: impl Into<String>, version: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self.version = Some(version.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn with_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.parameter = Some(parameter.into());
        self
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_conflict_paths(mut self, paths: Vec<String>) -> Self {
        self.conflict_paths = paths;
        self
    }

    pub fn identity_invalid(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::IdentityInvalid, detail)
    }

    pub fn manifest_invalid(
        path: impl Into<String>,
        field: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::ManifestInvalid, detail)
            .with_path(path)
            .with_field(field)
    }

    pub fn run_request_invalid(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(ErrorKind::RunRequestInvalid, reason.clone()).with_reason(reason)
    }

    pub fn io(context: impl Into<String>, err: &std::io::Error) -> Self {
        Self::new(ErrorKind::Io, format!("{}: {}", context.into(), err))
    }

    /// Render as the `error` object of a `result.json` document.
    /// `source` distinguishes engine-side failures from script exit codes.
    pub fn to_payload(&self, source: ErrorSource) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        obj.insert("type".into(), json!(self.kind.code()));
        obj.insert("source".into(), json!(source));
        obj.insert("message".into(), json!(self.message));
        if let Some(p) = &self.path {
            obj.insert("path".into(), json!(p));
        }
        if let Some(t) = &self.entity_type {
            obj.insert("entityType".into(), json!(t));
        }
        if let Some(id) = &self.id {
            obj.insert("id".into(), json!(id));
        }
        if let Some(v) = &self.version {
            obj.insert("version".into(), json!(v));
        }
        if let Some(f) = &self.field {
            obj.insert("field".into(), json!(f));
        }
        if let Some(r) = &self.reason {
            obj.insert("reason".into(), json!(r));
        }
        if let Some(e) = &self.env {
            obj.insert("env".into(), json!(e));
        }
        if let Some(p) = &self.parameter {
            obj.insert("parameter".into(), json!(p));
        }
        if let Some(n) = &self.node_id {
            obj.insert("nodeId".into(), json!(n));
        }
        if !self.conflict_paths.is_empty() {
            obj.insert("conflictPaths".into(), json!(self.conflict_paths));
        }
        serde_json::Value::Object(obj)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

/// Who caused a run-level error: the engine/runner or the script itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSource {
    Runner,
    Script,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ErrorKind::IdentityDuplicate.code(), "Identity.Duplicate");
        assert_eq!(
            ErrorKind::SuiteTestCaseRefInvalid.code(),
            "Suite.TestCaseRef.Invalid"
        );
        assert_eq!(ErrorKind::InputsEnumInvalid.code(), "Inputs.Enum.Invalid");
        assert_eq!(
            ErrorKind::InputFolderMissing.code(),
            "Runner.Input.Folder.Missing"
        );
    }

    #[test]
    fn payload_carries_context() {
        let err = EngineError::new(ErrorKind::EnvRefResolveFailed, "API_TOKEN is not set")
            .with_env("API_TOKEN")
            .with_parameter("token")
            .with_node_id("a");
        let payload = err.to_payload(ErrorSource::Runner);
        assert_eq!(payload["type"], "EnvRef.ResolveFailed");
        assert_eq!(payload["source"], "Runner");
        assert_eq!(payload["env"], "API_TOKEN");
        assert_eq!(payload["parameter"], "token");
        assert_eq!(payload["nodeId"], "a");
    }

    #[test]
    fn display_includes_code() {
        let err = EngineError::run_request_invalid("exactly one target required");
        assert_eq!(
            err.to_string(),
            "RunRequest.Invalid: exactly one target required"
        );
    }
}
