mod cli;
mod logging;
mod summary;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use crate::cli::Cli;
use crate::summary::BatchStatus;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match run(&cli).await {
        Ok(BatchStatus::Success) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            error!(target: "nsx", error = format!("{err:#}"), "batch aborted");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<BatchStatus> {
    let credentials = cli.credentials();
    let config = cli.config();
    let targets = cli.targets();

    let outcomes = nsx_core::run_batch(&config, &credentials, &targets).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        print!("{}", summary::render(&outcomes));
    }
    Ok(summary::classify(&outcomes))
}
