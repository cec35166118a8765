use crate::cli::args::DiscoverArgs;
use crate::exit_codes::{EXIT_CONFIG_ERROR, EXIT_SUCCESS};
use gauntlet_core::{DiscoveryResult, Engine, EngineOptions};
use serde_json::json;

pub fn run(args: DiscoverArgs) -> anyhow::Result<i32> {
    let opts = EngineOptions {
        cases_root: args.roots.cases_root.clone(),
        suites_root: args.roots.suites_root.clone(),
        plans_root: args.roots.plans_root.clone(),
        runs_root: args.roots.runs_root.clone(),
        interpreter: "pwsh".into(),
        interpreter_args: Vec::new(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        script_host_version: None,
    };
    let engine = Engine::new(opts);
    let result = engine.discover();

    match args.format.as_str() {
        "json" => print_json(&result)?,
        _ => print_text(&result),
    }

    if result.is_clean() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_CONFIG_ERROR)
    }
}

fn print_json(result: &DiscoveryResult) -> anyhow::Result<()> {
    let doc = json!({
        "cases": result
            .cases
            .iter()
            .map(|(id, d)| json!({
                "id": id.id(),
                "version": id.version(),
                "path": d.path.display().to_string(),
            }))
            .collect::<Vec<_>>(),
        "suites": result
            .suites
            .iter()
            .map(|(id, d)| json!({
                "id": id.id(),
                "version": id.version(),
                "path": d.path.display().to_string(),
                "testCases": d.manifest.test_cases.len(),
            }))
            .collect::<Vec<_>>(),
        "plans": result
            .plans
            .iter()
            .map(|(id, d)| json!({
                "id": id.id(),
                "version": id.version(),
                "path": d.path.display().to_string(),
                "suites": d.manifest.suites.len(),
            }))
            .collect::<Vec<_>>(),
        "errors": result
            .errors
            .iter()
            .map(|e| json!({"code": e.kind.code(), "message": e.message}))
            .collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn print_text(result: &DiscoveryResult) {
    println!(
        "discovered {} case(s), {} suite(s), {} plan(s)",
        result.cases.len(),
        result.suites.len(),
        result.plans.len()
    );
    for id in result.cases.keys() {
        println!("  case   {id}");
    }
    for id in result.suites.keys() {
        println!("  suite  {id}");
    }
    for id in result.plans.keys() {
        println!("  plan   {id}");
    }
    if !result.errors.is_empty() {
        println!("{} error(s):", result.errors.len());
        for e in &result.errors {
            println!("  {e}");
        }
    }
}
