//! wsbench-load: drive a wsbench server with concurrent echo clients.
//!
//! Exits 0 when every client completed and every echo matched, 1 otherwise.

use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use wsbench::cli::{LoadArgs, init_tracing};
use wsbench::loadgen;

#[tokio::main]
async fn main() -> ExitCode {
    let args = LoadArgs::parse();
    init_tracing(&args.log_level);
    let json = args.json;
    let config = args.into_config();

    info!(
        host = %config.host,
        port = config.port,
        path = %config.path,
        clients = config.clients,
        messages = config.messages,
        "Starting load run"
    );

    let report = loadgen::run(config).await;
    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("failed to serialize report: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{report}");
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
