use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gauntlet",
    version,
    about = "Test orchestration for script-based cases, suites, and plans"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Discover manifests under the cases/suites/plans roots
    Discover(DiscoverArgs),
    /// Run a test case, suite, or plan
    Run(RunArgs),
    /// Resume a suspended run (invoked by the autostart hook after a reboot)
    Resume(ResumeArgs),
    Version,
}

/// The three manifest roots plus the runs root.
#[derive(Parser, Debug, Clone)]
pub struct RootArgs {
    #[arg(long, default_value = "cases", env = "GAUNTLET_CASES_ROOT")]
    pub cases_root: PathBuf,
    #[arg(long, default_value = "suites", env = "GAUNTLET_SUITES_ROOT")]
    pub suites_root: PathBuf,
    #[arg(long, default_value = "plans", env = "GAUNTLET_PLANS_ROOT")]
    pub plans_root: PathBuf,
    #[arg(long, default_value = "runs", env = "GAUNTLET_RUNS_ROOT")]
    pub runs_root: PathBuf,
}

/// Which subprocess hosts the scripts.
#[derive(Parser, Debug, Clone)]
pub struct InterpreterArgs {
    /// Script interpreter executable
    #[arg(long, default_value = "pwsh", env = "GAUNTLET_INTERPRETER")]
    pub interpreter: PathBuf,
    /// Argument placed before the script path (repeatable). Defaults to
    /// `-NoProfile -File` for PowerShell hosts, empty otherwise.
    #[arg(long = "interpreter-arg")]
    pub interpreter_args: Vec<String>,
}

impl InterpreterArgs {
    pub fn effective_args(&self) -> Vec<String> {
        if !self.interpreter_args.is_empty() {
            return self.interpreter_args.clone();
        }
        let name = self
            .interpreter
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("pwsh") || name.contains("powershell") {
            vec!["-NoProfile".into(), "-File".into()]
        } else {
            Vec::new()
        }
    }
}

#[derive(Parser, Debug)]
pub struct DiscoverArgs {
    #[command(flatten)]
    pub roots: RootArgs,
    /// Output format: text or json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["case", "suite", "plan", "request"])))]
pub struct RunArgs {
    #[command(flatten)]
    pub roots: RootArgs,
    #[command(flatten)]
    pub interpreter: InterpreterArgs,
    /// Test case identity (id@version)
    #[arg(long)]
    pub case: Option<String>,
    /// Suite identity (id@version)
    #[arg(long)]
    pub suite: Option<String>,
    /// Plan identity (id@version)
    #[arg(long)]
    pub plan: Option<String>,
    /// Path to a full RunRequest JSON document
    #[arg(long)]
    pub request: Option<PathBuf>,
    /// Environment override, KEY=VALUE (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
    /// Case input override, NAME=JSON (repeatable; only with --case)
    #[arg(long = "input", value_name = "NAME=JSON")]
    pub inputs: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ResumeArgs {
    #[command(flatten)]
    pub roots: RootArgs,
    #[command(flatten)]
    pub interpreter: InterpreterArgs,
    /// Run id persisted in the resume session
    #[arg(long = "run-id")]
    pub run_id: String,
    /// Resume token issued when the session was persisted
    #[arg(long)]
    pub token: String,
}
