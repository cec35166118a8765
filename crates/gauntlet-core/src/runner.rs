//! Single-case run pipeline.
//!
//! Owns one case Run Folder from allocation to `result.json`: snapshots,
//! pre-launch validation, subprocess execution, the reboot control channel,
//! and index finalisation. Suite/plan executors and the engine façade all
//! funnel case execution through here.

use crate::argv::{render_argv, secrets_on_command_line};
use crate::engine::{EngineOptions, RunContext};
use crate::environment::EffectiveEnvironment;
use crate::errors::{EngineError, ErrorKind, ErrorSource};
use crate::events::{EventKind, EventWriter};
use crate::identity::Identity;
use crate::index::IndexEntry;
use crate::inputs::ResolvedInputs;
use crate::manifest::CaseManifest;
use crate::pathguard;
use crate::process::{self, ProcessOutcome, ProcessSpec};
use crate::redact::Redactor;
use crate::resume::{
    read_reboot_request, new_resume_token, RebootRequest, ResumeSession, SessionContext,
    SessionState,
};
use crate::runfolder::{
    now_iso, CaseResult, RunFolder, RunPrefix, EVENTS_JSONL, ENV_JSON, MANIFEST_JSON,
    PARAMS_JSON, RESULT_JSON, SCHEMA_VERSION, STDERR_LOG, STDOUT_LOG,
};
use crate::status::{RunStatus, RunType};
use crate::values::TypedValue;
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};

/// Identity and artifacts of an enclosing group run.
#[derive(Debug, Clone)]
pub(crate) struct GroupLink {
    pub identity: Identity,
    pub run_id: String,
    pub folder: PathBuf,
    pub start_time: String,
}

/// Where a case run sits in the suite/plan tree.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParentLink {
    pub node_id: Option<String>,
    pub suite: Option<GroupLink>,
    pub plan: Option<GroupLink>,
}

impl ParentLink {
    fn parent_run_id(&self) -> Option<String> {
        self.suite
            .as_ref()
            .or(self.plan.as_ref())
            .map(|g| g.run_id.clone())
    }
}

/// Everything resolved ahead of a case run.
#[derive(Debug, Clone)]
pub(crate) struct CaseExecution {
    pub manifest: CaseManifest,
    pub raw_manifest: Json,
    pub case_dir: PathBuf,
    pub resolved: ResolvedInputs,
    pub env: EffectiveEnvironment,
    pub working_dir: PathBuf,
    pub parents: ParentLink,
    /// Root target of the engine invocation, for the resume session.
    pub entity_type: RunType,
    pub entity_id: String,
}

#[derive(Debug, Clone)]
pub(crate) struct FinishedCase {
    pub run_id: String,
    pub folder: PathBuf,
    pub status: RunStatus,
}

#[derive(Debug, Clone)]
pub(crate) enum CaseOutcome {
    Finished(FinishedCase),
    /// The run persisted a resume session and asked the host to restart.
    Suspended { run_id: String },
}

/// Run one case attempt from scratch.
#[instrument(skip_all, fields(test = %exec.manifest.identity))]
pub(crate) async fn run_case(
    ctx: &RunContext,
    exec: CaseExecution,
) -> Result<CaseOutcome, EngineError> {
    let folder = RunFolder::allocate(&ctx.opts.runs_root, RunPrefix::Case)?;
    folder.prepare_case_dirs()?;
    let start_time = now_iso();
    let mut events = EventWriter::create(&folder.file(EVENTS_JSONL))?;
    events.emit(EventKind::RunStarted {
        run_type: RunType::TestCase,
        id: exec.manifest.identity.id().to_string(),
        version: exec.manifest.identity.version().to_string(),
        node_id: exec.parents.node_id.clone(),
    })?;
    info!(run_id = %folder.run_id, "case run started");

    write_case_snapshots(&folder, &exec, &ctx.opts, &start_time)?;

    // Pre-launch validation: working directory, path-typed inputs, script
    // containment. Failures finalise the run as an Error without launching.
    if let Err(err) = validate_runtime_paths(&exec, &folder) {
        let finished = finalize_case(
            ctx,
            &folder,
            &CaseIdentitySlice::from_exec(&exec),
            &exec.resolved.redacted,
            RunStatus::Error,
            None,
            Some(err.to_payload(ErrorSource::Runner)),
            None,
            &start_time,
        )?;
        return Ok(CaseOutcome::Finished(finished));
    }

    let script_path = match resolve_script(&exec) {
        Ok(path) => path,
        Err(err) => {
            let finished = finalize_case(
                ctx,
                &folder,
                &CaseIdentitySlice::from_exec(&exec),
                &exec.resolved.redacted,
                RunStatus::Error,
                None,
                Some(err.to_payload(ErrorSource::Runner)),
                None,
                &start_time,
            )?;
            return Ok(CaseOutcome::Finished(finished));
        }
    };

    let param_argv = render_argv(&exec.manifest, &exec.resolved);
    for parameter in secrets_on_command_line(&exec.resolved) {
        events.emit(EventKind::SecretOnCommandLine { parameter })?;
    }

    let redactor = Redactor::from_inputs(&exec.resolved);
    let spec = build_spec(
        &ctx.opts,
        &script_path,
        &param_argv,
        exec.env.to_map(),
        exec.working_dir.clone(),
        exec.manifest.timeout_sec,
        &folder,
        1,
    );

    let phase = PhaseIo {
        folder: &folder,
        redactor: &redactor,
        identity: CaseIdentitySlice::from_exec(&exec),
        redacted_inputs: exec.resolved.redacted.clone(),
        start_time: start_time.clone(),
    };
    let session_seed = SessionSeed {
        exec: &exec,
        script_path: &script_path,
        param_argv: &param_argv,
        prior_resume_count: 0,
    };
    run_phase_and_settle(ctx, phase, spec, Some(session_seed), None, &mut events).await
}

/// Re-enter a suspended case run from its persisted session.
#[instrument(skip_all, fields(run_id = %run_id))]
pub(crate) async fn resume_case(
    ctx: &RunContext,
    run_id: &str,
    token: &str,
) -> Result<CaseOutcome, EngineError> {
    let folder = RunFolder::open(&ctx.opts.runs_root, run_id)?;
    let session = ResumeSession::load(&folder.session_path())?;
    session.verify_token(token)?;
    if session.state != SessionState::PendingResume {
        return Err(EngineError::new(
            ErrorKind::ResumeSessionInvalid,
            format!("session for '{run_id}' is already finalized"),
        ));
    }
    if folder.is_finalised() {
        return Err(EngineError::new(
            ErrorKind::ResumeSessionInvalid,
            format!("run '{run_id}' already has a result"),
        ));
    }

    let mut events = EventWriter::create(&folder.file(EVENTS_JSONL))?;
    events.emit(EventKind::ResumeReentered {
        resume_count: session.resume_count,
    })?;
    info!(run_id, resume_count = session.resume_count, "resuming case run");

    let ctx_snapshot = &session.context;
    let mut secrets = Vec::new();
    for name in &ctx_snapshot.secret_inputs {
        if let Some(v) = ctx_snapshot.effective_inputs.get(name) {
            v.literal_strings(&mut secrets);
        }
    }
    let redactor = Redactor::new(secrets);
    let spec = build_spec(
        &ctx.opts,
        Path::new(&ctx_snapshot.script_path),
        &ctx_snapshot.argv,
        ctx_snapshot.environment.clone(),
        PathBuf::from(&ctx_snapshot.working_dir),
        ctx_snapshot.timeout_sec,
        &folder,
        session.next_phase,
    );

    let phase = PhaseIo {
        folder: &folder,
        redactor: &redactor,
        identity: CaseIdentitySlice::from_session(&session),
        redacted_inputs: ctx_snapshot.redacted_inputs.clone(),
        start_time: ctx_snapshot.start_time.clone(),
    };
    run_phase_and_settle(ctx, phase, spec, None, Some(session), &mut events).await
}

/// Per-phase shared state handed through the execute/settle path.
struct PhaseIo<'a> {
    folder: &'a RunFolder,
    redactor: &'a Redactor,
    identity: CaseIdentitySlice,
    redacted_inputs: BTreeMap<String, TypedValue>,
    start_time: String,
}

/// Borrowed pieces needed to build a fresh resume session.
struct SessionSeed<'a> {
    exec: &'a CaseExecution,
    script_path: &'a Path,
    param_argv: &'a [String],
    prior_resume_count: u32,
}

async fn run_phase_and_settle(
    ctx: &RunContext,
    phase: PhaseIo<'_>,
    spec: ProcessSpec,
    seed: Option<SessionSeed<'_>>,
    prior_session: Option<ResumeSession>,
    events: &mut EventWriter,
) -> Result<CaseOutcome, EngineError> {
    let outcome = match process::run(
        &spec,
        &phase.folder.file(STDOUT_LOG),
        &phase.folder.file(STDERR_LOG),
        phase.redactor,
        &ctx.cancel,
        events,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(launch_err) => {
            let finished = finalize_case(
                ctx,
                phase.folder,
                &phase.identity,
                &phase.redacted_inputs,
                RunStatus::Error,
                None,
                Some(launch_err.to_payload(ErrorSource::Runner)),
                prior_session.as_ref().map(|s| s.resume_count),
                &phase.start_time,
            )?;
            settle_session(ctx, phase.folder, prior_session, &finished)?;
            return Ok(CaseOutcome::Finished(finished));
        }
    };

    // The control channel only speaks after a clean exit; a killed process
    // cannot request a reboot.
    let reboot = if outcome.timed_out || outcome.aborted {
        None
    } else {
        match consume_reboot_request(phase.folder) {
            Ok(request) => request,
            Err(schema_err) => {
                let finished = finalize_case(
                    ctx,
                    phase.folder,
                    &phase.identity,
                    &phase.redacted_inputs,
                    RunStatus::Error,
                    outcome.exit_code,
                    Some(schema_err.to_payload(ErrorSource::Runner)),
                    prior_session.as_ref().map(|s| s.resume_count),
                    &phase.start_time,
                )?;
                settle_session(ctx, phase.folder, prior_session, &finished)?;
                return Ok(CaseOutcome::Finished(finished));
            }
        }
    };

    if let Some(request) = reboot {
        events.emit(EventKind::RebootRequested {
            next_phase: request.next_phase as u32,
            reason: request.reason.clone(),
            delay_sec: request.delay().as_secs(),
        })?;
        let session = match (&seed, &prior_session) {
            (Some(seed), _) => build_session(seed, phase.folder, &request, &phase.start_time),
            (None, Some(prior)) => continue_session(prior, &request),
            (None, None) => {
                return Err(EngineError::new(
                    ErrorKind::Internal,
                    "reboot requested but no session context available",
                ))
            }
        };
        session.save(&phase.folder.session_path())?;
        ctx.reboot_host.register_autostart(
            &ctx.opts.runs_root,
            &phase.folder.run_id,
            &session.resume_token,
        )?;
        ctx.reboot_host.request_restart(request.delay())?;
        info!(run_id = %phase.folder.run_id, next_phase = request.next_phase, "run suspended for reboot");
        return Ok(CaseOutcome::Suspended {
            run_id: phase.folder.run_id.clone(),
        });
    }

    let status = outcome.status();
    let error = script_error_payload(&outcome);
    let exit_code = if outcome.timed_out || outcome.aborted {
        None
    } else {
        outcome.exit_code
    };
    let finished = finalize_case(
        ctx,
        phase.folder,
        &phase.identity,
        &phase.redacted_inputs,
        status,
        exit_code,
        error,
        prior_session.as_ref().map(|s| s.resume_count),
        &phase.start_time,
    )?;
    settle_session(ctx, phase.folder, prior_session, &finished)?;
    Ok(CaseOutcome::Finished(finished))
}

/// Identity fields copied into results and index entries.
#[derive(Debug, Clone)]
struct CaseIdentitySlice {
    test_id: String,
    test_version: String,
    node_id: Option<String>,
    suite_id: Option<String>,
    suite_version: Option<String>,
    plan_id: Option<String>,
    plan_version: Option<String>,
    parent_run_id: Option<String>,
}

impl CaseIdentitySlice {
    fn from_exec(exec: &CaseExecution) -> CaseIdentitySlice {
        CaseIdentitySlice {
            test_id: exec.manifest.identity.id().to_string(),
            test_version: exec.manifest.identity.version().to_string(),
            node_id: exec.parents.node_id.clone(),
            suite_id: exec
                .parents
                .suite
                .as_ref()
                .map(|g| g.identity.id().to_string()),
            suite_version: exec
                .parents
                .suite
                .as_ref()
                .map(|g| g.identity.version().to_string()),
            plan_id: exec
                .parents
                .plan
                .as_ref()
                .map(|g| g.identity.id().to_string()),
            plan_version: exec
                .parents
                .plan
                .as_ref()
                .map(|g| g.identity.version().to_string()),
            parent_run_id: exec.parents.parent_run_id(),
        }
    }

    fn from_session(session: &ResumeSession) -> CaseIdentitySlice {
        let c = &session.context;
        CaseIdentitySlice {
            test_id: c.test_id.clone(),
            test_version: c.test_version.clone(),
            node_id: c.node_id.clone(),
            suite_id: c.suite_id.clone(),
            suite_version: c.suite_version.clone(),
            plan_id: c.plan_id.clone(),
            plan_version: c.plan_version.clone(),
            parent_run_id: c.suite_run_id.clone().or_else(|| c.plan_run_id.clone()),
        }
    }
}

fn write_case_snapshots(
    folder: &RunFolder,
    exec: &CaseExecution,
    opts: &EngineOptions,
    start_time: &str,
) -> Result<(), EngineError> {
    let snapshot = json!({
        "manifest": exec.raw_manifest,
        "resolvedIdentity": {
            "id": exec.manifest.identity.id(),
            "version": exec.manifest.identity.version(),
        },
        "effectiveEnvironment": exec.env.to_map(),
        "effectiveInputs": exec.resolved.redacted,
        "inputTemplates": exec.resolved.templates,
        "resolvedAt": start_time,
        "engineVersion": opts.engine_version,
    });
    folder.write_json(MANIFEST_JSON, &snapshot)?;
    folder.write_json(PARAMS_JSON, &exec.resolved.redacted)?;
    folder.write_json(ENV_JSON, &host_env_doc(opts))?;
    Ok(())
}

fn host_env_doc(opts: &EngineOptions) -> Json {
    json!({
        "osVersion": sysinfo::System::long_os_version()
            .unwrap_or_else(|| std::env::consts::OS.to_string()),
        "runnerVersion": opts.engine_version,
        "scriptHostVersion": opts.script_host_version,
        "isElevated": is_elevated(),
    })
}

#[cfg(unix)]
fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn is_elevated() -> bool {
    false
}

/// Working directory and path-typed input checks, all against the final
/// resolved locations.
fn validate_runtime_paths(exec: &CaseExecution, folder: &RunFolder) -> Result<(), EngineError> {
    if !exec.working_dir.is_dir() {
        return Err(EngineError::new(
            ErrorKind::WorkingDirInvalid,
            format!(
                "working directory '{}' does not exist",
                exec.working_dir.display()
            ),
        ));
    }

    for def in &exec.manifest.parameters {
        if !def.ty.is_pathlike() {
            continue;
        }
        let Some(value) = exec.resolved.effective.get(&def.name) else {
            continue;
        };
        let mut raw_paths = Vec::new();
        value.literal_strings(&mut raw_paths);
        for raw in raw_paths {
            let candidate = Path::new(&raw);
            let resolved = if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                // Relative path inputs live inside the Run Folder.
                let joined = folder.path.join(candidate);
                if !pathguard::contains(&folder.path, &joined) {
                    return Err(EngineError::new(
                        ErrorKind::InputPathInvalid,
                        format!(
                            "input '{}' escapes the run folder: '{raw}'",
                            def.name
                        ),
                    )
                    .with_parameter(def.name.clone()));
                }
                joined
            };
            match def.ty.kind {
                crate::values::ScalarKind::File => {
                    if !resolved.is_file() {
                        return Err(EngineError::new(
                            ErrorKind::InputFileMissing,
                            format!("input '{}' file not found: '{raw}'", def.name),
                        )
                        .with_parameter(def.name.clone()));
                    }
                }
                crate::values::ScalarKind::Folder => {
                    if !resolved.is_dir() {
                        return Err(EngineError::new(
                            ErrorKind::InputFolderMissing,
                            format!("input '{}' folder not found: '{raw}'", def.name),
                        )
                        .with_parameter(def.name.clone()));
                    }
                }
                _ => {}
            }
        }
    }
    Ok(())
}

fn resolve_script(exec: &CaseExecution) -> Result<PathBuf, EngineError> {
    let script_path = pathguard::canonical(&exec.case_dir.join(&exec.manifest.script));
    if !pathguard::contains(&exec.case_dir, &script_path) {
        return Err(EngineError::new(
            ErrorKind::ManifestInvalid,
            format!(
                "script '{}' escapes the case directory",
                exec.manifest.script
            ),
        )
        .with_field("script"));
    }
    if !script_path.is_file() {
        return Err(EngineError::new(
            ErrorKind::Io,
            format!("script '{}' not found", script_path.display()),
        ));
    }
    Ok(script_path)
}

/// Environment keys the engine adds so the script can find its run folder
/// and the control channel.
#[allow(clippy::too_many_arguments)]
fn build_spec(
    opts: &EngineOptions,
    script_path: &Path,
    param_argv: &[String],
    mut env: BTreeMap<String, String>,
    working_dir: PathBuf,
    timeout_sec: Option<u32>,
    folder: &RunFolder,
    phase: u32,
) -> ProcessSpec {
    let mut args = opts.interpreter_args.clone();
    args.push(script_path.display().to_string());
    args.extend(param_argv.iter().cloned());
    env.insert("GAUNTLET_RUN_ID".into(), folder.run_id.clone());
    env.insert("GAUNTLET_RUN_DIR".into(), folder.path.display().to_string());
    env.insert(
        "GAUNTLET_ARTIFACTS_DIR".into(),
        folder.artifacts_dir().display().to_string(),
    );
    env.insert(
        "GAUNTLET_CONTROL_DIR".into(),
        folder.control_dir().display().to_string(),
    );
    env.insert("GAUNTLET_PHASE".into(), phase.to_string());
    ProcessSpec {
        program: opts.interpreter.clone(),
        args,
        env,
        working_dir,
        timeout: timeout_sec.map(|s| Duration::from_secs(s as u64)),
    }
}

/// Read and delete `control/reboot.json`. The file is consumed so a stale
/// request cannot re-trigger after resume.
fn consume_reboot_request(folder: &RunFolder) -> Result<Option<RebootRequest>, EngineError> {
    let path = folder.reboot_request_path();
    let result = read_reboot_request(&path);
    if path.exists() {
        let _ = std::fs::remove_file(&path);
    }
    result
}

fn build_session(
    seed: &SessionSeed<'_>,
    folder: &RunFolder,
    request: &RebootRequest,
    start_time: &str,
) -> ResumeSession {
    let exec = seed.exec;
    ResumeSession {
        run_id: folder.run_id.clone(),
        entity_type: exec.entity_type,
        entity_id: exec.entity_id.clone(),
        current_case_id: Some(exec.manifest.identity.to_string()),
        next_phase: request.next_phase as u32,
        resume_token: new_resume_token(),
        resume_count: seed.prior_resume_count + 1,
        state: SessionState::PendingResume,
        context: SessionContext {
            manifest: exec.raw_manifest.clone(),
            test_id: exec.manifest.identity.id().to_string(),
            test_version: exec.manifest.identity.version().to_string(),
            script_path: seed.script_path.display().to_string(),
            working_dir: exec.working_dir.display().to_string(),
            timeout_sec: exec.manifest.timeout_sec,
            environment: exec.env.to_map(),
            effective_inputs: exec.resolved.effective.clone(),
            redacted_inputs: exec.resolved.redacted.clone(),
            secret_inputs: exec.resolved.secret_inputs.clone(),
            templates: exec.resolved.templates.clone(),
            argv: seed.param_argv.to_vec(),
            start_time: start_time.to_string(),
            node_id: exec.parents.node_id.clone(),
            suite_id: exec
                .parents
                .suite
                .as_ref()
                .map(|g| g.identity.id().to_string()),
            suite_version: exec
                .parents
                .suite
                .as_ref()
                .map(|g| g.identity.version().to_string()),
            plan_id: exec
                .parents
                .plan
                .as_ref()
                .map(|g| g.identity.id().to_string()),
            plan_version: exec
                .parents
                .plan
                .as_ref()
                .map(|g| g.identity.version().to_string()),
            suite_run_id: exec.parents.suite.as_ref().map(|g| g.run_id.clone()),
            suite_run_folder: exec
                .parents
                .suite
                .as_ref()
                .map(|g| g.folder.display().to_string()),
            suite_start_time: exec.parents.suite.as_ref().map(|g| g.start_time.clone()),
            plan_run_id: exec.parents.plan.as_ref().map(|g| g.run_id.clone()),
            plan_run_folder: exec
                .parents
                .plan
                .as_ref()
                .map(|g| g.folder.display().to_string()),
            plan_start_time: exec.parents.plan.as_ref().map(|g| g.start_time.clone()),
        },
    }
}

fn continue_session(prior: &ResumeSession, request: &RebootRequest) -> ResumeSession {
    let mut session = prior.clone();
    session.next_phase = request.next_phase as u32;
    session.resume_token = new_resume_token();
    session.resume_count = prior.resume_count + 1;
    session.state = SessionState::PendingResume;
    session
}

fn script_error_payload(outcome: &ProcessOutcome) -> Option<Json> {
    if outcome.timed_out || outcome.aborted {
        return None;
    }
    match outcome.exit_code {
        Some(0) | Some(1) => None,
        Some(code) => Some(
            EngineError::new(
                ErrorKind::Internal,
                format!("script exited with unexpected code {code}"),
            )
            .to_payload(ErrorSource::Script),
        ),
        None => Some(
            EngineError::new(
                ErrorKind::Internal,
                "script terminated without an exit code",
            )
            .to_payload(ErrorSource::Script),
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn finalize_case(
    ctx: &RunContext,
    folder: &RunFolder,
    identity: &CaseIdentitySlice,
    redacted_inputs: &BTreeMap<String, TypedValue>,
    status: RunStatus,
    exit_code: Option<i32>,
    error: Option<Json>,
    resume_count: Option<u32>,
    start_time: &str,
) -> Result<FinishedCase, EngineError> {
    let end_time = now_iso();
    let result = CaseResult {
        schema_version: SCHEMA_VERSION,
        run_type: RunType::TestCase,
        node_id: identity.node_id.clone(),
        test_id: identity.test_id.clone(),
        test_version: identity.test_version.clone(),
        suite_id: identity.suite_id.clone(),
        suite_version: identity.suite_version.clone(),
        plan_id: identity.plan_id.clone(),
        plan_version: identity.plan_version.clone(),
        status,
        start_time: start_time.to_string(),
        end_time: end_time.clone(),
        exit_code,
        effective_inputs: redacted_inputs.clone(),
        error,
        resume_count,
    };
    folder.write_json(RESULT_JSON, &result)?;
    ctx.index.append(&IndexEntry {
        run_id: folder.run_id.clone(),
        run_type: RunType::TestCase,
        id: identity.test_id.clone(),
        version: identity.test_version.clone(),
        node_id: identity.node_id.clone(),
        parent_run_id: identity.parent_run_id.clone(),
        start_time: start_time.to_string(),
        end_time,
        status,
    })?;
    info!(run_id = %folder.run_id, %status, "case run finalised");
    Ok(FinishedCase {
        run_id: folder.run_id.clone(),
        folder: folder.path.clone(),
        status,
    })
}

/// Finalise a case Run Folder for a node whose run could not even be
/// assembled (unresolvable ref, bad inputs). The failure becomes an
/// `Error`-status result so the suite keeps a full audit trail.
pub(crate) fn run_failed_case(
    ctx: &RunContext,
    test_id: &str,
    test_version: &str,
    parents: &ParentLink,
    err: &EngineError,
) -> Result<FinishedCase, EngineError> {
    let folder = RunFolder::allocate(&ctx.opts.runs_root, RunPrefix::Case)?;
    folder.prepare_case_dirs()?;
    let start_time = now_iso();
    let mut events = EventWriter::create(&folder.file(EVENTS_JSONL))?;
    events.emit(EventKind::RunStarted {
        run_type: RunType::TestCase,
        id: test_id.to_string(),
        version: test_version.to_string(),
        node_id: parents.node_id.clone(),
    })?;
    let identity = CaseIdentitySlice {
        test_id: test_id.to_string(),
        test_version: test_version.to_string(),
        node_id: parents.node_id.clone(),
        suite_id: parents.suite.as_ref().map(|g| g.identity.id().to_string()),
        suite_version: parents
            .suite
            .as_ref()
            .map(|g| g.identity.version().to_string()),
        plan_id: parents.plan.as_ref().map(|g| g.identity.id().to_string()),
        plan_version: parents
            .plan
            .as_ref()
            .map(|g| g.identity.version().to_string()),
        parent_run_id: parents.parent_run_id(),
    };
    finalize_case(
        ctx,
        &folder,
        &identity,
        &BTreeMap::new(),
        RunStatus::Error,
        None,
        Some(err.to_payload(ErrorSource::Runner)),
        None,
        &start_time,
    )
}

/// After a resumed run finishes: mark the session finalized, drop the
/// autostart hook, and complete any parent group folders captured in the
/// session.
fn settle_session(
    ctx: &RunContext,
    folder: &RunFolder,
    session: Option<ResumeSession>,
    finished: &FinishedCase,
) -> Result<(), EngineError> {
    let Some(mut session) = session else {
        return Ok(());
    };
    session.state = SessionState::Finalized;
    session.save(&folder.session_path())?;
    ctx.reboot_host.remove_autostart(&folder.run_id)?;
    crate::executor::finalize_groups_from_session(ctx, &session, finished)?;
    Ok(())
}
