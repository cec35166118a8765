//! Engine façade: options, request validation, discovery, dispatch.

use crate::discovery::{self, DiscoveryResult};
use crate::environment::EffectiveEnvironment;
use crate::errors::{EngineError, ErrorKind};
use crate::executor::{self, GroupOutcome};
use crate::identity::Identity;
use crate::index::RunIndex;
use crate::request::{RunRequest, RunTarget};
use crate::resume::{NoopRebootHost, RebootHost};
use crate::runner::{self, CaseExecution, CaseOutcome, ParentLink};
use crate::status::{RunStatus, RunType};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// All configuration the engine needs. There are no hidden globals; the
/// filesystem and the index mutex are the only process-wide state.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub cases_root: PathBuf,
    pub suites_root: PathBuf,
    pub plans_root: PathBuf,
    pub runs_root: PathBuf,
    /// Script interpreter executable, e.g. `pwsh`.
    pub interpreter: PathBuf,
    /// Arguments placed before the script path, e.g. `["-File"]`.
    pub interpreter_args: Vec<String>,
    pub engine_version: String,
    pub script_host_version: Option<String>,
}

/// Per-invocation execution context handed down to runners and executors.
pub(crate) struct RunContext {
    pub opts: Arc<EngineOptions>,
    pub cancel: CancellationToken,
    pub reboot_host: Arc<dyn RebootHost>,
    pub index: RunIndex,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub run_folder: PathBuf,
    pub status: RunStatus,
}

/// What an engine invocation produced: a finished run, or a suspension
/// because a case requested a machine restart.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunSummary),
    Suspended { run_id: String },
}

pub struct Engine {
    opts: Arc<EngineOptions>,
    reboot_host: Arc<dyn RebootHost>,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(opts: EngineOptions) -> Engine {
        Engine {
            opts: Arc::new(opts),
            reboot_host: Arc::new(NoopRebootHost),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_reboot_host(mut self, host: Arc<dyn RebootHost>) -> Engine {
        self.reboot_host = host;
        self
    }

    /// Token the host can trip to abort an in-flight run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.opts
    }

    /// Scan all three roots for manifests.
    pub fn discover(&self) -> DiscoveryResult {
        discovery::discover(
            &self.opts.cases_root,
            &self.opts.suites_root,
            &self.opts.plans_root,
        )
    }

    /// Validate the request, discover manifests, and dispatch to the
    /// matching executor.
    pub async fn run(&self, request: &RunRequest) -> Result<RunOutcome, EngineError> {
        let target = request.validate()?;
        let discovery = self.discover();
        if !discovery.is_clean() {
            let (entity_type, identity) = target_fields(&target);
            let first = &discovery.errors[0];
            return Err(EngineError::new(
                ErrorKind::RunRequestResolveFailed,
                format!(
                    "discovery reported {} error(s); first: {first}",
                    discovery.errors.len()
                ),
            )
            .with_entity_type(entity_type)
            .with_identity(identity.id(), identity.version())
            .with_reason("discovery failed"));
        }

        let ctx = self.context();
        match target {
            RunTarget::Case(identity) => {
                let Some(discovered) = discovery.cases.get(&identity) else {
                    return Err(resolve_failed(RunType::TestCase, &identity));
                };
                info!(case = %identity, "dispatching standalone case run");
                let outcome = self.run_standalone_case(&ctx, discovered, request).await?;
                Ok(case_outcome_to_run(outcome))
            }
            RunTarget::Suite(identity) => {
                let Some(discovered) = discovery.suites.get(&identity) else {
                    return Err(resolve_failed(RunType::TestSuite, &identity));
                };
                info!(suite = %identity, "dispatching suite run");
                let outcome = executor::suite::run_suite(
                    &ctx,
                    discovered,
                    request,
                    None,
                    RunType::TestSuite,
                    &identity.to_string(),
                )
                .await?;
                Ok(group_outcome_to_run(outcome))
            }
            RunTarget::Plan(identity) => {
                let Some(discovered) = discovery.plans.get(&identity) else {
                    return Err(resolve_failed(RunType::TestPlan, &identity));
                };
                info!(plan = %identity, "dispatching plan run");
                let outcome =
                    executor::plan::run_plan(&ctx, &discovery, discovered, request).await?;
                Ok(group_outcome_to_run(outcome))
            }
        }
    }

    /// Re-enter a suspended run. Invoked by the autostart hook with the
    /// persisted run id and resume token.
    pub async fn resume(&self, run_id: &str, token: &str) -> Result<RunOutcome, EngineError> {
        let ctx = self.context();
        let outcome = runner::resume_case(&ctx, run_id, token).await?;
        Ok(case_outcome_to_run(outcome))
    }

    fn context(&self) -> RunContext {
        RunContext {
            opts: self.opts.clone(),
            cancel: self.cancel.clone(),
            reboot_host: self.reboot_host.clone(),
            index: RunIndex::new(&self.opts.runs_root),
        }
    }

    async fn run_standalone_case(
        &self,
        ctx: &RunContext,
        discovered: &crate::discovery::Discovered<crate::manifest::CaseManifest>,
        request: &RunRequest,
    ) -> Result<CaseOutcome, EngineError> {
        let identity = discovered.manifest.identity.clone();
        let parents = ParentLink::default();

        let env = match EffectiveEnvironment::merge(
            &EffectiveEnvironment::process_env(),
            None,
            None,
            request.env_overrides(),
        ) {
            Ok(env) => env,
            Err(err) => {
                let finished = runner::run_failed_case(
                    ctx,
                    identity.id(),
                    identity.version(),
                    &parents,
                    &err,
                )?;
                return Ok(CaseOutcome::Finished(finished));
            }
        };

        let resolved = match crate::inputs::resolve(
            &discovered.manifest,
            None,
            request.case_inputs.as_ref(),
            &env,
            None,
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
                return Ok(CaseOutcome::Finished(finished));
            }
        };

        let exec = CaseExecution {
            manifest: discovered.manifest.clone(),
            raw_manifest: discovered.raw.clone(),
            case_dir: discovered.dir.clone(),
            resolved,
            env,
            working_dir: discovered.dir.clone(),
            parents,
            entity_type: RunType::TestCase,
            entity_id: identity.to_string(),
        };
        runner::run_case(ctx, exec).await
    }
}

fn target_fields(target: &RunTarget) -> (RunType, &Identity) {
    match target {
        RunTarget::Case(id) => (RunType::TestCase, id),
        RunTarget::Suite(id) => (RunType::TestSuite, id),
        RunTarget::Plan(id) => (RunType::TestPlan, id),
    }
}

fn resolve_failed(entity_type: RunType, identity: &Identity) -> EngineError {
    EngineError::new(
        ErrorKind::RunRequestResolveFailed,
        format!("{entity_type} '{identity}' was not found by discovery"),
    )
    .with_entity_type(entity_type)
    .with_identity(identity.id(), identity.version())
    .with_reason("not found")
}

fn case_outcome_to_run(outcome: CaseOutcome) -> RunOutcome {
    match outcome {
        CaseOutcome::Finished(f) => RunOutcome::Completed(RunSummary {
            run_id: f.run_id,
            run_folder: f.folder,
            status: f.status,
        }),
        CaseOutcome::Suspended { run_id } => RunOutcome::Suspended { run_id },
    }
}

fn group_outcome_to_run(outcome: GroupOutcome) -> RunOutcome {
    match outcome {
        GroupOutcome::Finished {
            run_id,
            folder,
            status,
        } => RunOutcome::Completed(RunSummary {
            run_id,
            run_folder: folder,
            status,
        }),
        GroupOutcome::Suspended { run_id } => RunOutcome::Suspended { run_id },
    }
}
