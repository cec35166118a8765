use super::super::args::{Cli, Command};
use crate::exit_codes::EXIT_SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Discover(args) => super::discover::run(args),
        Command::Run(args) => super::run::run(args).await,
        Command::Resume(args) => super::resume::run(args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(EXIT_SUCCESS)
        }
    }
}
