//! Plan execution: sequential suite iteration and aggregation.

use super::{finalize_group, suite, GroupOutcome};
use crate::discovery::{Discovered, DiscoveryResult};
use crate::engine::RunContext;
use crate::errors::{EngineError, ErrorKind};
use crate::events::{EventKind, EventWriter};
use crate::manifest::PlanManifest;
use crate::request::RunRequest;
use crate::runfolder::{
    now_iso, PlanChildLine, RunFolder, RunPrefix, CHILDREN_JSONL, ENVIRONMENT_JSON,
    EVENTS_JSONL, MANIFEST_JSON, RUN_REQUEST_JSON,
};
use crate::runner::GroupLink;
use crate::status::{aggregate, RunStatus, RunType};
use tracing::{info, instrument};

#[instrument(skip_all, fields(plan = %plan.manifest.identity))]
pub(crate) async fn run_plan(
    ctx: &RunContext,
    discovery: &DiscoveryResult,
    plan: &Discovered<PlanManifest>,
    request: &RunRequest,
) -> Result<GroupOutcome, EngineError> {
    let manifest = &plan.manifest;
    let folder = RunFolder::allocate(&ctx.opts.runs_root, RunPrefix::Group)?;
    let start_time = now_iso();
    let mut events = EventWriter::create(&folder.file(EVENTS_JSONL))?;
    events.emit(EventKind::RunStarted {
        run_type: RunType::TestPlan,
        id: manifest.identity.id().to_string(),
        version: manifest.identity.version().to_string(),
        node_id: None,
    })?;
    info!(run_id = %folder.run_id, "plan run started");

    folder.write_json(MANIFEST_JSON, &plan.raw)?;
    folder.write_json(
        ENVIRONMENT_JSON,
        &manifest.env.clone().unwrap_or_default(),
    )?;
    folder.write_json(RUN_REQUEST_JSON, request)?;

    // Every suite ref must resolve before anything runs.
    let mut suites = Vec::with_capacity(manifest.suites.len());
    for suite_id in &manifest.suites {
        match discovery.suites.get(suite_id) {
            Some(discovered) => suites.push(discovered),
            None => {
                let err = EngineError::new(
                    ErrorKind::PlanSuiteRefNotFound,
                    format!("plan references unknown suite '{suite_id}'"),
                )
                .with_entity_type(RunType::TestSuite)
                .with_identity(suite_id.id(), suite_id.version());
                finalize_group(
                    ctx,
                    &folder,
                    RunType::TestPlan,
                    manifest.identity.id(),
                    manifest.identity.version(),
                    RunStatus::Error,
                    Vec::new(),
                    &[],
                    None,
                    &start_time,
                )?;
                return Err(err);
            }
        }
    }

    let plan_link = GroupLink {
        identity: manifest.identity.clone(),
        run_id: folder.run_id.clone(),
        folder: folder.path.clone(),
        start_time: start_time.clone(),
    };
    let entity_id = manifest.identity.to_string();

    let mut child_run_ids = Vec::new();
    let mut child_statuses = Vec::new();
    for discovered in suites {
        if ctx.cancel.is_cancelled() {
            info!("cancellation observed between suites; stopping");
            break;
        }
        let suite_request = RunRequest {
            suite: Some(discovered.manifest.identity.to_string()),
            environment_overrides: request.environment_overrides.clone(),
            ..RunRequest::default()
        };
        let outcome = suite::run_suite(
            ctx,
            discovered,
            &suite_request,
            Some((&plan_link, manifest.env.as_ref())),
            RunType::TestPlan,
            &entity_id,
        )
        .await?;
        match outcome {
            GroupOutcome::Suspended { run_id } => {
                return Ok(GroupOutcome::Suspended { run_id });
            }
            GroupOutcome::Finished {
                run_id, status, ..
            } => {
                folder.append_jsonl(
                    CHILDREN_JSONL,
                    &PlanChildLine {
                        run_id: run_id.clone(),
                        suite_id: discovered.manifest.identity.id().to_string(),
                        suite_version: discovered.manifest.identity.version().to_string(),
                        status,
                    },
                )?;
                child_run_ids.push(run_id);
                child_statuses.push(status);
            }
        }
    }

    let status = aggregate(child_statuses.iter().copied());
    finalize_group(
        ctx,
        &folder,
        RunType::TestPlan,
        manifest.identity.id(),
        manifest.identity.version(),
        status,
        child_run_ids,
        &child_statuses,
        None,
        &start_time,
    )?;
    info!(run_id = %folder.run_id, %status, "plan run finalised");
    Ok(GroupOutcome::Finished {
        run_id: folder.run_id,
        folder: folder.path,
        status,
    })
}
