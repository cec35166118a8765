pub mod discover;
pub mod dispatch;
pub mod resume;
pub mod run;

pub use dispatch::dispatch;

use crate::cli::args::{InterpreterArgs, RootArgs};
use gauntlet_core::EngineOptions;

/// Build engine options from CLI arguments.
pub(crate) fn engine_options(roots: &RootArgs, interpreter: &InterpreterArgs) -> EngineOptions {
    EngineOptions {
        cases_root: roots.cases_root.clone(),
        suites_root: roots.suites_root.clone(),
        plans_root: roots.plans_root.clone(),
        runs_root: roots.runs_root.clone(),
        interpreter: interpreter.interpreter.clone(),
        interpreter_args: interpreter.effective_args(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        script_host_version: None,
    }
}
