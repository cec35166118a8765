//! Suite execution: sequential node iteration with repeat, retry-on-error,
//! and continue-on-failure controls.

use super::{finalize_group, GroupOutcome};
use crate::discovery::Discovered;
use crate::engine::RunContext;
use crate::environment::EffectiveEnvironment;
use crate::errors::EngineError;
use crate::events::{EventKind, EventWriter};
use crate::identity::Identity;
use crate::manifest::{self, CaseManifest, SuiteManifest, SuiteNode};
use crate::pathguard;
use crate::refres::resolve_suite_ref;
use crate::request::RunRequest;
use crate::runfolder::{
    now_iso, RunFolder, RunPrefix, SuiteChildLine, CHILDREN_JSONL, CONTROLS_JSON,
    ENVIRONMENT_JSON, EVENTS_JSONL, MANIFEST_JSON, RUN_REQUEST_JSON,
};
use crate::runner::{self, CaseExecution, CaseOutcome, GroupLink, ParentLink};
use crate::status::{aggregate, RunStatus, RunType};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Run one suite. `plan` carries the enclosing plan's group link and
/// environment layer when the suite runs as part of a plan.
#[instrument(skip_all, fields(suite = %suite.manifest.identity))]
pub(crate) async fn run_suite(
    ctx: &RunContext,
    suite: &Discovered<SuiteManifest>,
    request: &RunRequest,
    plan: Option<(&GroupLink, Option<&BTreeMap<String, String>>)>,
    entity_type: RunType,
    entity_id: &str,
) -> Result<GroupOutcome, EngineError> {
    let manifest = &suite.manifest;
    let folder = RunFolder::allocate(&ctx.opts.runs_root, RunPrefix::Group)?;
    let start_time = now_iso();
    let mut events = EventWriter::create(&folder.file(EVENTS_JSONL))?;
    events.emit(EventKind::RunStarted {
        run_type: RunType::TestSuite,
        id: manifest.identity.id().to_string(),
        version: manifest.identity.version().to_string(),
        node_id: None,
    })?;
    info!(run_id = %folder.run_id, "suite run started");

    folder.write_json(MANIFEST_JSON, &suite.raw)?;
    folder.write_json(CONTROLS_JSON, &manifest.controls)?;
    folder.write_json(RUN_REQUEST_JSON, request)?;

    // Node overrides must name known nodes.
    if let Some(overrides) = &request.node_overrides {
        let known = manifest.node_ids();
        for key in overrides.keys() {
            if !known.contains(key.as_str()) {
                let err = EngineError::run_request_invalid(format!(
                    "nodeOverrides names unknown nodeId '{key}'"
                ))
                .with_node_id(key.clone());
                fail_group(ctx, &folder, manifest, plan, &start_time, &err)?;
                return Err(err);
            }
        }
    }

    let plan_env = plan.and_then(|(_, env)| env);
    let env = match EffectiveEnvironment::merge(
        &EffectiveEnvironment::process_env(),
        plan_env,
        manifest.environment.env.as_ref(),
        request.env_overrides(),
    ) {
        Ok(env) => env,
        Err(err) => {
            fail_group(ctx, &folder, manifest, plan, &start_time, &err)?;
            return Err(err);
        }
    };
    folder.write_json(ENVIRONMENT_JSON, &env.to_map())?;

    if manifest.controls.max_parallel > 1 {
        warn!(declared = manifest.controls.max_parallel, "maxParallel ignored; executing sequentially");
        events.emit(EventKind::MaxParallelIgnored {
            declared: manifest.controls.max_parallel,
        })?;
    }

    let suite_link = GroupLink {
        identity: manifest.identity.clone(),
        run_id: folder.run_id.clone(),
        folder: folder.path.clone(),
        start_time: start_time.clone(),
    };

    let mut child_run_ids = Vec::new();
    let mut child_statuses = Vec::new();
    let mut node_final_statuses = Vec::new();
    'iterations: for _ in 0..manifest.controls.repeat {
        for node in &manifest.test_cases {
            if ctx.cancel.is_cancelled() {
                info!("cancellation observed between nodes; stopping");
                break 'iterations;
            }
            let override_inputs = request
                .node_overrides
                .as_ref()
                .and_then(|o| o.get(&node.node_id))
                .map(|o| &o.inputs);

            let mut last_status = RunStatus::Error;
            for attempt in 0..=manifest.controls.retry_on_error {
                let outcome = run_node_attempt(
                    ctx,
                    suite,
                    node,
                    override_inputs,
                    &env,
                    &suite_link,
                    plan.map(|(link, _)| link),
                    entity_type,
                    entity_id,
                )
                .await?;
                let (finished, identity) = match outcome {
                    NodeAttempt::Suspended { run_id } => {
                        return Ok(GroupOutcome::Suspended { run_id });
                    }
                    NodeAttempt::Done(finished, identity) => (finished, identity),
                };
                last_status = finished.status;
                let (test_id, test_version) = match &identity {
                    Some(id) => (id.id().to_string(), id.version().to_string()),
                    None => (node.ref_path.clone(), String::new()),
                };
                folder.append_jsonl(
                    CHILDREN_JSONL,
                    &SuiteChildLine {
                        run_id: finished.run_id.clone(),
                        node_id: node.node_id.clone(),
                        test_id,
                        test_version,
                        status: finished.status,
                    },
                )?;
                events.emit(EventKind::NodeFinished {
                    node_id: node.node_id.clone(),
                    run_id: finished.run_id.clone(),
                    status: finished.status,
                })?;
                child_run_ids.push(finished.run_id);
                child_statuses.push(finished.status);
                if !last_status.is_retryable() {
                    break;
                }
                if attempt < manifest.controls.retry_on_error {
                    info!(node = %node.node_id, %last_status, "retrying node after retryable status");
                }
            }
            node_final_statuses.push(last_status);

            if last_status != RunStatus::Passed && !manifest.controls.continue_on_failure {
                info!(node = %node.node_id, %last_status, "stopping suite (continueOnFailure=false)");
                break 'iterations;
            }
        }
    }

    let status = aggregate(node_final_statuses.iter().copied());
    finalize_group(
        ctx,
        &folder,
        RunType::TestSuite,
        manifest.identity.id(),
        manifest.identity.version(),
        status,
        child_run_ids,
        &child_statuses,
        plan.map(|(link, _)| link.run_id.clone()),
        &start_time,
    )?;
    info!(run_id = %folder.run_id, %status, "suite run finalised");
    Ok(GroupOutcome::Finished {
        run_id: folder.run_id,
        folder: folder.path,
        status,
    })
}

enum NodeAttempt {
    Done(runner::FinishedCase, Option<Identity>),
    Suspended { run_id: String },
}

#[allow(clippy::too_many_arguments)]
async fn run_node_attempt(
    ctx: &RunContext,
    suite: &Discovered<SuiteManifest>,
    node: &SuiteNode,
    override_inputs: Option<&BTreeMap<String, serde_json::Value>>,
    env: &EffectiveEnvironment,
    suite_link: &GroupLink,
    plan_link: Option<&GroupLink>,
    entity_type: RunType,
    entity_id: &str,
) -> Result<NodeAttempt, EngineError> {
    let parents = ParentLink {
        node_id: Some(node.node_id.clone()),
        suite: Some(suite_link.clone()),
        plan: plan_link.cloned(),
    };

    let manifest_path =
        match resolve_suite_ref(&suite.path, &ctx.opts.cases_root, &node.ref_path) {
            Ok(path) => path,
            Err(err) => {
                let finished =
                    runner::run_failed_case(ctx, &node.ref_path, "", &parents, &err)?;
                return Ok(NodeAttempt::Done(finished, None));
            }
        };
    let raw = match manifest::read_raw(&manifest_path) {
        Ok(raw) => raw,
        Err(err) => {
            let finished = runner::run_failed_case(ctx, &node.ref_path, "", &parents, &err)?;
            return Ok(NodeAttempt::Done(finished, None));
        }
    };
    let case = match CaseManifest::from_raw(&manifest_path, &raw) {
        Ok(case) => case,
        Err(err) => {
            let finished = runner::run_failed_case(ctx, &node.ref_path, "", &parents, &err)?;
            return Ok(NodeAttempt::Done(finished, None));
        }
    };
    let identity = case.identity.clone();
    let case_dir = manifest_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| ctx.opts.cases_root.clone());

    let resolved = match crate::inputs::resolve(
        &case,
        node.inputs.as_ref(),
        override_inputs,
        env,
        Some(&node.node_id),
    ) {
        Ok(resolved) => resolved,
        Err(err) => {
            let finished = runner::run_failed_case(
                ctx,
                identity.id(),
                identity.version(),
                &parents,
                &err,
            )?;
            return Ok(NodeAttempt::Done(finished, Some(identity)));
        }
    };

    let working_dir = working_dir_for(suite, &case_dir);
    let exec = CaseExecution {
        manifest: case,
        raw_manifest: raw,
        case_dir,
        resolved,
        env: env.clone(),
        working_dir,
        parents,
        entity_type,
        entity_id: entity_id.to_string(),
    };
    match runner::run_case(ctx, exec).await? {
        CaseOutcome::Finished(finished) => Ok(NodeAttempt::Done(finished, Some(identity))),
        CaseOutcome::Suspended { run_id } => Ok(NodeAttempt::Suspended { run_id }),
    }
}

/// A suite-declared working directory resolves against the suite manifest's
/// own directory; otherwise the case directory is the working directory.
fn working_dir_for(suite: &Discovered<SuiteManifest>, case_dir: &std::path::Path) -> PathBuf {
    match &suite.manifest.environment.working_dir {
        Some(dir) => {
            let candidate = PathBuf::from(dir);
            if candidate.is_absolute() {
                candidate
            } else {
                pathguard::canonical(&suite.dir.join(candidate))
            }
        }
        None => case_dir.to_path_buf(),
    }
}

/// Close the group folder with an `Error` result when the suite cannot run
/// at all (bad request, bad environment).
fn fail_group(
    ctx: &RunContext,
    folder: &RunFolder,
    manifest: &SuiteManifest,
    plan: Option<(&GroupLink, Option<&BTreeMap<String, String>>)>,
    start_time: &str,
    _err: &EngineError,
) -> Result<(), EngineError> {
    finalize_group(
        ctx,
        folder,
        RunType::TestSuite,
        manifest.identity.id(),
        manifest.identity.version(),
        RunStatus::Error,
        Vec::new(),
        &[],
        plan.map(|(link, _)| link.run_id.clone()),
        start_time,
    )
}
