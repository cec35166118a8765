use crate::cli::args::ResumeArgs;
use crate::exit_codes::{code_for_error, code_for_status, EXIT_SUCCESS};
use gauntlet_core::{Engine, RunOutcome};
use tracing::info;

pub async fn run(args: ResumeArgs) -> anyhow::Result<i32> {
    let opts = super::engine_options(&args.roots, &args.interpreter);
    let engine = Engine::new(opts);

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; aborting resumed run");
            cancel.cancel();
        }
    });

    match engine.resume(&args.run_id, &args.token).await {
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
