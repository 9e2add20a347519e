//! Server option resolution: flags, then environment, then the user config
//! file, then built-in defaults.

use crate::error::{DebugError, Result};
use crate::user_config::UserConfig;
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 0;
pub const DEFAULT_BASE_PATH: &str = "/";
pub const DEFAULT_LOGS_DIR: &str = ".logs";
pub const DEFAULT_MAX_BODY_KB: u64 = 64;

/// One source of option values. Every field is optional; the first layer
/// that sets a field wins.
#[derive(Debug, Clone, Default)]
pub struct OptionLayer {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub base_path: Option<String>,
    pub logs_dir: Option<PathBuf>,
    pub max_body_kb: Option<u64>,
    pub token: Option<String>,
    pub idle_ttl_ms: Option<u64>,
}

impl OptionLayer {
    /// Values taken from `DEBUGSK_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            host: crate::clienv::host(),
            port: crate::clienv::port(),
            base_path: crate::clienv::base_path(),
            logs_dir: crate::clienv::logs_dir(),
            max_body_kb: crate::clienv::max_body_kb(),
            token: crate::clienv::token(),
            idle_ttl_ms: crate::clienv::idle_ttl_ms(),
        }
    }
}

impl From<UserConfig> for OptionLayer {
    fn from(config: UserConfig) -> Self {
        Self {
            host: config.host,
            port: config.port,
            base_path: config.base_path,
            logs_dir: config.logs_dir,
            max_body_kb: config.max_body_kb,
            token: config.token,
            idle_ttl_ms: config.idle_ttl_ms,
        }
    }
}

/// Fully resolved options for one daemon instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    pub host: String,
    /// `0` asks for any free port.
    pub port: u16,
    /// Normalized: empty for the root, otherwise `/prefix` without a trailing slash.
    pub base_path: String,
    /// Absolute.
    pub logs_dir: PathBuf,
    pub max_body_kb: u64,
    pub token: Option<String>,
    pub idle_ttl_ms: Option<u64>,
    pub cwd: PathBuf,
}

impl ServerOptions {
    /// Resolve options for `cwd` from CLI flags, the environment and the user config file.
    pub fn resolve(flags: OptionLayer, cwd: &Path) -> Result<Self> {
        let file = UserConfig::load().map_err(|e| DebugError::Config(format!("{e:#}")))?;
        Self::from_layers(&[flags, OptionLayer::from_env(), file.into()], cwd)
    }

    pub fn from_layers(layers: &[OptionLayer], cwd: &Path) -> Result<Self> {
        macro_rules! pick {
            ($field:ident) => {
                layers.iter().find_map(|layer| layer.$field.clone())
            };
        }

        let max_body_kb = pick!(max_body_kb).unwrap_or(DEFAULT_MAX_BODY_KB);
        if max_body_kb == 0 {
            return Err(DebugError::Config("max body size must be at least 1 KB".into()));
        }

        let logs_dir = pick!(logs_dir).unwrap_or_else(|| PathBuf::from(DEFAULT_LOGS_DIR));

        Ok(Self {
            host: pick!(host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: pick!(port).unwrap_or(DEFAULT_PORT),
            base_path: normalize_base_path(
                pick!(base_path).as_deref().unwrap_or(DEFAULT_BASE_PATH),
            ),
            logs_dir: resolve_logs_dir(cwd, &logs_dir),
            max_body_kb,
            token: pick!(token),
            idle_ttl_ms: pick!(idle_ttl_ms).filter(|ttl| *ttl > 0),
            cwd: cwd.to_path_buf(),
        })
    }

    pub fn max_body_bytes(&self) -> usize {
        usize::try_from(self.max_body_kb.saturating_mul(1024)).unwrap_or(usize::MAX)
    }
}

/// Logs directory made absolute against `cwd`.
pub fn resolve_logs_dir(cwd: &Path, logs_dir: &Path) -> PathBuf {
    if logs_dir.as_os_str().is_empty() {
        cwd.join(DEFAULT_LOGS_DIR)
    } else {
        cwd.join(logs_dir)
    }
}

/// `""` and `"/"` map to the empty prefix; otherwise ensure one leading slash
/// and drop a trailing one.
pub fn normalize_base_path(base_path: &str) -> String {
    let trimmed = base_path.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return String::new();
    }
    let with_leading = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    with_leading
        .strip_suffix('/')
        .map(str::to_string)
        .unwrap_or(with_leading)
}
