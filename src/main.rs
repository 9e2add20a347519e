mod args;
mod commands;

use args::{Cli, Commands};
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Run { .. }));

    let json = cli.json;
    let result = match cli.command {
        Commands::Start { force, server } => commands::start::cmd_start(server, force, json).await,
        Commands::Run { server } => commands::run::cmd_run(server).await,
        Commands::Status { logs } => commands::status::cmd_status(logs, json),
        Commands::Stop { logs } => commands::stop::cmd_stop(logs, json).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            commands::report_error(&e, json);
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(daemon: bool) {
    let default = if daemon { "debugsk=info,tower_http=info" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!daemon)
        .init();
}
