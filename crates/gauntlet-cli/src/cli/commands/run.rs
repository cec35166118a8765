use crate::cli::args::RunArgs;
use crate::exit_codes::{code_for_error, code_for_status, EXIT_CONFIG_ERROR, EXIT_SUCCESS};
use gauntlet_core::request::{EnvironmentOverrides, RunRequest};
use gauntlet_core::{Engine, RunOutcome};
use std::collections::BTreeMap;
use tracing::info;

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let request = match build_request(&args) {
        Ok(request) => request,
        Err(message) => {
            eprintln!("error: {message}");
            return Ok(EXIT_CONFIG_ERROR);
        }
    };

    let opts = super::engine_options(&args.roots, &args.interpreter);
    let engine = Engine::new(opts);

    // Ctrl-C aborts the in-flight subprocess and finalises the run.
    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; aborting run");
            cancel.cancel();
        }
    });

    match engine.run(&request).await {
        Ok(RunOutcome::Completed(summary)) => {
            println!(
                "{} {} -> {}",
                summary.run_id,
                summary.status,
                summary.run_folder.display()
            );
            Ok(code_for_status(summary.status))
        }
        Ok(RunOutcome::Suspended { run_id }) => {
            println!("{run_id} suspended for reboot");
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(code_for_error(&e))
        }
    }
}

fn build_request(args: &RunArgs) -> Result<RunRequest, String> {
    let mut request = if let Some(path) = &args.request {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        serde_json::from_str::<RunRequest>(&text)
            .map_err(|e| format!("invalid RunRequest in {}: {e}", path.display()))?
    } else if let Some(case) = &args.case {
        RunRequest::for_case(case.clone())
    } else if let Some(suite) = &args.suite {
        RunRequest::for_suite(suite.clone())
    } else if let Some(plan) = &args.plan {
        RunRequest::for_plan(plan.clone())
    } else {
        return Err("one of --case, --suite, --plan, --request is required".into());
    };

    if !args.env.is_empty() {
        let mut env = request
            .environment_overrides
            .take()
            .map(|o| o.env)
            .unwrap_or_default();
        for pair in &args.env {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("--env expects KEY=VALUE, got '{pair}'"))?;
            env.insert(key.to_string(), value.to_string());
        }
        request.environment_overrides = Some(EnvironmentOverrides { env });
    }

    if !args.inputs.is_empty() {
        if request.test_case.is_none() {
            return Err("--input is only valid together with --case".into());
        }
        let mut inputs: BTreeMap<String, serde_json::Value> =
            request.case_inputs.take().unwrap_or_default();
        for pair in &args.inputs {
            let (name, raw) = pair
                .split_once('=')
                .ok_or_else(|| format!("--input expects NAME=JSON, got '{pair}'"))?;
            // JSON literals pass through; anything unparsable is a string.
            let value = serde_json::from_str(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
            inputs.insert(name.to_string(), value);
        }
        request.case_inputs = Some(inputs);
    }

    Ok(request)
}
