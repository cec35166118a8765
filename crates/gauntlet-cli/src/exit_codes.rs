//! Unified exit codes for the Gauntlet CLI.
//!
//! Codes are coarse and stable for CI consumption; fine-grained semantics
//! live in the run artifacts (`result.json`, `index.jsonl`).

/// The run finished and everything passed (or discovery was clean).
pub const EXIT_SUCCESS: i32 = 0;

/// The run finished with a non-passed status (Failed/Timeout/Error/Aborted).
pub const EXIT_RUN_FAILED: i32 = 1;

/// Configuration or user error: bad request, bad manifests, unknown target.
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Engine or host failure (I/O, internal error).
pub const EXIT_ENGINE_ERROR: i32 = 3;

use gauntlet_core::{EngineError, RunStatus};

pub fn code_for_status(status: RunStatus) -> i32 {
    match status {
        RunStatus::Passed => EXIT_SUCCESS,
        _ => EXIT_RUN_FAILED,
    }
}

pub fn code_for_error(err: &EngineError) -> i32 {
    if err.kind.is_validation() {
        EXIT_CONFIG_ERROR
    } else {
        EXIT_ENGINE_ERROR
    }
}
