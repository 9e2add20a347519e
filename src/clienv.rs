use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVar {
    ConfigDir,
    Host,
    Port,
    BasePath,
    LogsDir,
    MaxBodyKb,
    Token,
    IdleTtlMs,
}

impl EnvVar {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigDir => "DEBUGSK_CONFIG_DIR",
            Self::Host => "DEBUGSK_HOST",
            Self::Port => "DEBUGSK_PORT",
            Self::BasePath => "DEBUGSK_BASE_PATH",
            Self::LogsDir => "DEBUGSK_LOGS_DIR",
            Self::MaxBodyKb => "DEBUGSK_MAX_BODY_KB",
            Self::Token => "DEBUGSK_TOKEN",
            Self::IdleTtlMs => "DEBUGSK_IDLE_TTL_MS",
        }
    }
}

const FALLBACK_CONFIG_DIR: &str = "~/.config";
const DEBUGSK_SUBDIR: &str = "debugsk";

/// Non-empty value of an environment variable.
pub fn env_opt(var: EnvVar) -> Option<String> {
    std::env::var(var.as_str()).ok().filter(|v| !v.trim().is_empty())
}

/// Parsed numeric value; unparsable input is logged and ignored.
fn env_number<T: std::str::FromStr>(var: EnvVar) -> Option<T> {
    let raw = env_opt(var)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = var.as_str(), value = %raw, "Ignoring non-numeric env var");
            None
        }
    }
}

/// debugsk config directory ($DEBUGSK_CONFIG_DIR or ~/.config/debugsk)
pub fn config_dir() -> PathBuf {
    let dir = env_opt(EnvVar::ConfigDir)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from(FALLBACK_CONFIG_DIR))
                .join(DEBUGSK_SUBDIR)
        });
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}

/// Listen host override ($DEBUGSK_HOST)
pub fn host() -> Option<String> {
    let val = env_opt(EnvVar::Host);
    tracing::trace!(value = ?val, "DEBUGSK_HOST env var");
    val
}

/// Listen port override ($DEBUGSK_PORT)
pub fn port() -> Option<u16> {
    env_number(EnvVar::Port)
}

/// Base path override ($DEBUGSK_BASE_PATH)
pub fn base_path() -> Option<String> {
    env_opt(EnvVar::BasePath)
}

/// Logs directory override ($DEBUGSK_LOGS_DIR)
pub fn logs_dir() -> Option<PathBuf> {
    let val = env_opt(EnvVar::LogsDir).map(PathBuf::from);
    tracing::trace!(value = ?val, "DEBUGSK_LOGS_DIR env var");
    val
}

/// Max ingest body size override ($DEBUGSK_MAX_BODY_KB)
pub fn max_body_kb() -> Option<u64> {
    env_number(EnvVar::MaxBodyKb)
}

/// Shared ingest token ($DEBUGSK_TOKEN). The value itself is never logged.
pub fn token() -> Option<String> {
    let val = env_opt(EnvVar::Token);
    tracing::trace!(present = val.is_some(), "DEBUGSK_TOKEN env var");
    val
}

/// Idle shutdown override ($DEBUGSK_IDLE_TTL_MS)
pub fn idle_ttl_ms() -> Option<u64> {
    env_number(EnvVar::IdleTtlMs)
}
