//! Suite and plan executors.

pub(crate) mod plan;
pub(crate) mod suite;

use crate::engine::RunContext;
use crate::errors::EngineError;
use crate::index::IndexEntry;
use crate::resume::ResumeSession;
use crate::runfolder::{
    now_iso, GroupResult, PlanChildLine, RunFolder, SuiteChildLine, CHILDREN_JSONL, RESULT_JSON,
    SCHEMA_VERSION,
};
use crate::runner::FinishedCase;
use crate::status::{aggregate, RunStatus, RunType};
use std::path::PathBuf;

/// Result of a suite or plan execution.
#[derive(Debug, Clone)]
pub(crate) enum GroupOutcome {
    Finished {
        run_id: String,
        folder: PathBuf,
        status: RunStatus,
    },
    /// A case underneath requested a reboot; the engine is about to stop.
    Suspended { run_id: String },
}

/// Write a group's `result.json` and its index entry.
#[allow(clippy::too_many_arguments)]
pub(crate) fn finalize_group(
    ctx: &RunContext,
    folder: &RunFolder,
    run_type: RunType,
    id: &str,
    version: &str,
    status: RunStatus,
    child_run_ids: Vec<String>,
    child_statuses: &[RunStatus],
    parent_run_id: Option<String>,
    start_time: &str,
) -> Result<(), EngineError> {
    let end_time = now_iso();
    let result = GroupResult {
        schema_version: SCHEMA_VERSION,
        run_type,
        id: id.to_string(),
        version: version.to_string(),
        status,
        start_time: start_time.to_string(),
        end_time: end_time.clone(),
        child_run_ids,
        counts: GroupResult::count_statuses(child_statuses.iter()),
    };
    folder.write_json(RESULT_JSON, &result)?;
    ctx.index.append(&IndexEntry {
        run_id: folder.run_id.clone(),
        run_type,
        id: id.to_string(),
        version: version.to_string(),
        node_id: None,
        parent_run_id,
        start_time: start_time.to_string(),
        end_time,
        status,
    })?;
    Ok(())
}

/// Complete parent group folders after a reboot-resumed case finishes.
///
/// The engine process that owned the suite/plan iteration died at the
/// restart, so the resumed engine closes those folders from the children
/// recorded up to the suspension plus the resumed case itself. Nodes that
/// never started are not invented; suite controls do not restart across the
/// boundary.
pub(crate) fn finalize_groups_from_session(
    ctx: &RunContext,
    session: &ResumeSession,
    finished: &FinishedCase,
) -> Result<(), EngineError> {
    let c = &session.context;

    let mut suite_summary: Option<(String, String, String, RunStatus)> = None;
    if let (Some(folder), Some(run_id), Some(id), Some(version)) = (
        &c.suite_run_folder,
        &c.suite_run_id,
        &c.suite_id,
        &c.suite_version,
    ) {
        let group = RunFolder {
            run_id: run_id.clone(),
            path: PathBuf::from(folder),
        };
        if !group.is_finalised() {
            group.append_jsonl(
                CHILDREN_JSONL,
                &SuiteChildLine {
                    run_id: finished.run_id.clone(),
                    node_id: c.node_id.clone().unwrap_or_default(),
                    test_id: c.test_id.clone(),
                    test_version: c.test_version.clone(),
                    status: finished.status,
                },
            )?;
            let children = group.read_children()?;
            let statuses: Vec<RunStatus> = children.iter().map(|(_, s)| *s).collect();
            let status = aggregate(statuses.iter().copied());
            let start = c.suite_start_time.clone().unwrap_or_else(now_iso);
            finalize_group(
                ctx,
                &group,
                RunType::TestSuite,
                id,
                version,
                status,
                children.iter().map(|(r, _)| r.clone()).collect(),
                &statuses,
                c.plan_run_id.clone(),
                &start,
            )?;
            suite_summary = Some((run_id.clone(), id.clone(), version.clone(), status));
        }
    }

    if let (Some(folder), Some(run_id), Some(id), Some(version)) = (
        &c.plan_run_folder,
        &c.plan_run_id,
        &c.plan_id,
        &c.plan_version,
    ) {
        let group = RunFolder {
            run_id: run_id.clone(),
            path: PathBuf::from(folder),
        };
        if !group.is_finalised() {
            if let Some((suite_run, suite_id, suite_version, suite_status)) = &suite_summary {
                group.append_jsonl(
                    CHILDREN_JSONL,
                    &PlanChildLine {
                        run_id: suite_run.clone(),
                        suite_id: suite_id.clone(),
                        suite_version: suite_version.clone(),
                        status: *suite_status,
                    },
                )?;
            }
            let children = group.read_children()?;
            let statuses: Vec<RunStatus> = children.iter().map(|(_, s)| *s).collect();
            let status = aggregate(statuses.iter().copied());
            let start = c.plan_start_time.clone().unwrap_or_else(now_iso);
            finalize_group(
                ctx,
                &group,
                RunType::TestPlan,
                id,
                version,
                status,
                children.iter().map(|(r, _)| r.clone()).collect(),
                &statuses,
                None,
                &start,
            )?;
        }
    }

    Ok(())
}
