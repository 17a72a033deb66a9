use std::process::ExitCode;

use clap::Parser;
use deploy_scripts::{cli::Cli, utils::setup_logging};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing `.env` is fine, the environment may be set directly
    dotenvy::dotenv().ok();
    setup_logging();

    let Cli {
        network,
        networks_file,
        deployments_path,
        command,
    } = Cli::parse();

    match command.run(&network, networks_file, deployments_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}
