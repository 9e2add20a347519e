use clap::{Args, Parser, Subcommand};
use debugsk::OptionLayer;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "debugsk")]
#[command(version)]
#[command(about = "Local collector for runtime debug events", long_about = None)]
pub(crate) struct Cli {
    /// Print one JSON object on stdout instead of a summary line
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start the collector in the background (no-op if already running)
    Start {
        /// Replace a running collector instead of reusing it
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        server: ServerArgs,
    },

    /// Serve in the foreground until signalled or idle
    Run {
        #[command(flatten)]
        server: ServerArgs,
    },

    /// Show whether a collector is running for the logs directory
    Status {
        #[command(flatten)]
        logs: LogsArgs,
    },

    /// Stop the collector for the logs directory
    Stop {
        #[command(flatten)]
        logs: LogsArgs,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct LogsArgs {
    /// Directory for session logs and runtime state (default: .logs)
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct ServerArgs {
    /// Interface to bind (default: 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind; 0 picks a free port (default: 0)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path prefix for every route (default: /)
    #[arg(long)]
    pub base_path: Option<String>,

    #[command(flatten)]
    pub logs: LogsArgs,

    /// Largest accepted request body in KB (default: 64)
    #[arg(long = "max-body-kb")]
    pub max_body_kb: Option<u64>,

    /// Require this token on ingest requests (prefer DEBUGSK_TOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Shut down after this many milliseconds without an ingest
    #[arg(long = "idle-ttl-ms")]
    pub idle_ttl_ms: Option<u64>,
}

impl From<LogsArgs> for OptionLayer {
    fn from(args: LogsArgs) -> Self {
        Self {
            logs_dir: args.logs_dir,
            ..Default::default()
        }
    }
}

impl From<ServerArgs> for OptionLayer {
    fn from(args: ServerArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            base_path: args.base_path,
            logs_dir: args.logs.logs_dir,
            max_body_kb: args.max_body_kb,
            token: args.token,
            idle_ttl_ms: args.idle_ttl_ms,
        }
    }
}
