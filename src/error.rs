use thiserror::Error;

/// Hint printed next to `legacy_runtime_incompatible`.
pub const LEGACY_RUNTIME_HINT: &str =
    "delete .logs/runtime.json or the entire .logs directory, then retry";

#[derive(Error, Debug)]
pub enum DebugError {
    #[error("runtime descriptor uses a legacy format")]
    LegacyRuntime,

    #[error("daemon did not write a runtime descriptor within {waited_ms}ms")]
    StartFailed { waited_ms: u64 },

    #[error("daemon at {url} did not pass its health check within {waited_ms}ms")]
    HealthCheckFailed { url: String, waited_ms: u64 },

    #[error("daemon process {pid} could not be terminated")]
    StopFailed { pid: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Internal(String),
}

impl DebugError {
    /// Stable machine-readable code, used in `--json` output and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LegacyRuntime => "legacy_runtime_incompatible",
            Self::StartFailed { .. } => "start_failed",
            Self::HealthCheckFailed { .. } => "health_check_failed",
            Self::StopFailed { .. } => "stop_failed",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Http(_) => "http_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Operator-facing remedy, when there is an obvious one.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::LegacyRuntime => Some(LEGACY_RUNTIME_HINT.to_string()),
            Self::StartFailed { .. } | Self::HealthCheckFailed { .. } => {
                Some("check server.log in the logs directory".to_string())
            }
            Self::StopFailed { pid } => Some(format!(
                "process {pid} is still alive; runtime.json and server.pid were left in place"
            )),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DebugError>;
