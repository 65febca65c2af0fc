//! dojo-gate command-line entry point.

use clap::Parser;
use std::process::ExitCode;

use dojo_gate::cli::{run, Cli};
use dojo_gate::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init_tracing(cli.debug);

    if run(cli).await {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
