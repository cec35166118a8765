//! Suite test-case reference resolution.
//!
//! A suite node's `ref` is a directory path relative to the Cases root. The
//! combined path is resolved through symlinks (junctions/reparse points on
//! Windows) to its final target, which must still live under the Cases root
//! and contain a case manifest.

use crate::discovery::CASE_MANIFEST;
use crate::errors::{EngineError, ErrorKind};
use crate::pathguard;
use crate::status::RunType;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefFailure {
    OutOfRoot,
    NotFound,
    MissingManifest,
}

impl RefFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefFailure::OutOfRoot => "OutOfRoot",
            RefFailure::NotFound => "NotFound",
            RefFailure::MissingManifest => "MissingManifest",
        }
    }
}

/// Resolve `ref_path` to the case manifest path it points at.
pub fn resolve_suite_ref(
    suite_path: &Path,
    cases_root: &Path,
    ref_path: &str,
) -> Result<PathBuf, EngineError> {
    // Resolve the root itself first so symlinked ancestors of the root do
    // not defeat the comparison.
    let cases_root = pathguard::final_target(cases_root);
    let combined = pathguard::canonical(&cases_root.join(ref_path));
    let resolved = pathguard::final_target(&combined);

    if !pathguard::contains(&cases_root, &resolved) {
        return Err(ref_error(
            suite_path,
            &cases_root,
            ref_path,
            &resolved,
            RefFailure::OutOfRoot,
        ));
    }
    if !resolved.is_dir() {
        return Err(ref_error(
            suite_path,
            &cases_root,
            ref_path,
            &resolved,
            RefFailure::NotFound,
        ));
    }
    let manifest_path = resolved.join(CASE_MANIFEST);
    if !manifest_path.is_file() {
        return Err(ref_error(
            suite_path,
            &cases_root,
            ref_path,
            &resolved,
            RefFailure::MissingManifest,
        ));
    }
    Ok(manifest_path)
}

fn ref_error(
    suite_path: &Path,
    cases_root: &Path,
    ref_path: &str,
    resolved: &Path,
    failure: RefFailure,
) -> EngineError {
    EngineError::new(
        ErrorKind::SuiteTestCaseRefInvalid,
        format!(
            "ref '{}' resolved to '{}' ({}; expected root {})",
            ref_path,
            resolved.display(),
            failure.as_str(),
            cases_root.display(),
        ),
    )
    .with_entity_type(RunType::TestSuite)
    .with_path(suite_path.display().to_string())
    .with_field(ref_path)
    .with_reason(failure.as_str())
}
