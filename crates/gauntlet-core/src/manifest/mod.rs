//! Manifest models: test case, suite, and plan.
//!
//! Files are decoded as raw JSON first (the raw document is what run
//! snapshots preserve), then validated into the typed models here. Validation
//! failures carry the manifest path and the offending field.

mod case;
mod plan;
mod suite;

pub use case::{CaseManifest, ParameterDef, DEFAULT_SCRIPT};
pub use plan::PlanManifest;
pub use suite::{SuiteControls, SuiteEnvironment, SuiteManifest, SuiteNode, TimeoutPolicy};

use crate::errors::EngineError;
use serde_json::Value as Json;
use std::path::Path;

/// Read and decode a manifest file into raw JSON.
pub(crate) fn read_raw(path: &Path) -> Result<Json, EngineError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::io(format!("reading {}", path.display()), &e))?;
    serde_json::from_str(&text).map_err(|e| {
        EngineError::manifest_invalid(
            path.display().to_string(),
            "",
            format!("invalid JSON: {e}"),
        )
    })
}

pub(crate) fn field_err(
    path: &Path,
    field: &str,
    detail: impl Into<String>,
) -> EngineError {
    EngineError::manifest_invalid(path.display().to_string(), field, detail)
}
