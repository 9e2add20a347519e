//! Start, inspect and stop the detached ingest daemon.
//!
//! All coordination goes through `runtime.json` and `server.pid`; there is no
//! lock, so two simultaneous `start` calls for one logs directory can race.

use super::paths::server_log_path;
use super::process::{is_alive, terminate, POLL_INTERVAL};
use super::runtime::{mark_stopped, read_pid, read_runtime, remove_pid, Descriptor, RuntimeInfo};
use crate::clienv::EnvVar;
use crate::config::ServerOptions;
use crate::error::{DebugError, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Bound on each of the two start-up waits (descriptor, then health).
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period between SIGTERM and SIGKILL.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_millis(3000);

const HEALTH_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub runtime: RuntimeInfo,
    /// A live daemon was already running and was left alone.
    pub existing: bool,
    pub spawned_pid: Option<u32>,
}

impl StartOutcome {
    /// A paste-ready browser/Node snippet posting one event to this daemon.
    pub fn js_fetch_snippet(&self) -> String {
        let mut headers = serde_json::Map::new();
        headers.insert("Content-Type".into(), "application/json".into());
        if self.runtime.options.token_enabled {
            headers.insert("Authorization".into(), "Bearer YOUR_TOKEN".into());
        }
        format!(
            "fetch(\"{}\",{{method:\"POST\",headers:{},body:JSON.stringify({{...}})}}).catch(()=>{{}});",
            self.runtime.ingest_url_template(),
            serde_json::Value::Object(headers)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub running: bool,
    /// The descriptor with `running` recomputed from the live process table.
    pub runtime: Option<RuntimeInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOutcome {
    /// This call terminated a daemon.
    pub stopped: bool,
    pub pid: Option<u32>,
}

pub struct Controller {
    logs_dir: PathBuf,
    executable: PathBuf,
    startup_timeout: Duration,
    stop_grace: Duration,
}

impl Controller {
    /// Controller for `logs_dir` that spawns the current executable.
    pub fn new(logs_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            logs_dir: logs_dir.into(),
            executable: std::env::current_exe()?,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
        })
    }

    /// Spawn `executable run ...` instead of the current executable.
    pub fn with_executable(mut self, executable: impl Into<PathBuf>) -> Self {
        self.executable = executable.into();
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Ensure a healthy daemon is serving `logs_dir`.
    ///
    /// A live daemon is reported as `existing` unless `force` is set, in
    /// which case it is replaced. Stale state from a crashed daemon is
    /// cleaned before spawning.
    pub async fn start(&self, options: &ServerOptions, force: bool) -> Result<StartOutcome> {
        match read_runtime(&self.logs_dir) {
            Some(Descriptor::Legacy) => return Err(DebugError::LegacyRuntime),
            Some(Descriptor::Current(info)) if owner_alive(&info) && !force => {
                info!(pid = info.pid, base_url = %info.server.base_url, "Daemon already running");
                return Ok(StartOutcome {
                    runtime: info,
                    existing: true,
                    spawned_pid: None,
                });
            }
            Some(Descriptor::Current(info)) if owner_alive(&info) => {
                info!(pid = info.pid, "Replacing running daemon");
                if !terminate(info.pid, self.stop_grace).await {
                    return Err(DebugError::StopFailed { pid: info.pid });
                }
                self.clear_state()?;
            }
            Some(Descriptor::Current(info)) => {
                if info.running {
                    warn!(pid = info.pid, "Previous daemon exited without cleanup");
                }
                self.clear_state()?;
            }
            None => {}
        }

        let mut child = self.spawn_daemon(options)?;
        let pid = child.id();
        info!(pid, executable = %self.executable.display(), "Spawned daemon");

        let runtime = self.wait_for_runtime(&mut child).await?;
        self.wait_for_health(&runtime).await?;

        info!(pid, base_url = %runtime.server.base_url, "Daemon is healthy");
        Ok(StartOutcome {
            runtime,
            existing: false,
            spawned_pid: Some(pid),
        })
    }

    /// Current descriptor with a freshly computed `running` flag.
    pub fn status(&self) -> Result<StatusReport> {
        match read_runtime(&self.logs_dir) {
            None => Ok(StatusReport {
                running: false,
                runtime: None,
            }),
            Some(Descriptor::Legacy) => Err(DebugError::LegacyRuntime),
            Some(Descriptor::Current(mut info)) => {
                info.running = owner_alive(&info);
                Ok(StatusReport {
                    running: info.running,
                    runtime: Some(info),
                })
            }
        }
    }

    /// Terminate the daemon, then mark it stopped and drop the pid marker.
    ///
    /// If the process survives SIGKILL the on-disk state is left untouched.
    pub async fn stop(&self) -> Result<StopOutcome> {
        let info = match read_runtime(&self.logs_dir) {
            None => {
                debug!(logs_dir = %self.logs_dir.display(), "No descriptor, nothing to stop");
                return Ok(StopOutcome {
                    stopped: false,
                    pid: None,
                });
            }
            Some(Descriptor::Legacy) => return Err(DebugError::LegacyRuntime),
            Some(Descriptor::Current(info)) => info,
        };

        if let Some(marker) = read_pid(&self.logs_dir) {
            if marker != info.pid {
                warn!(marker, pid = info.pid, "Pid marker disagrees with descriptor");
            }
        }

        if !info.running {
            // Cleanly stopped earlier; the pid may already belong to
            // an unrelated process.
            remove_pid(&self.logs_dir)?;
            return Ok(StopOutcome {
                stopped: false,
                pid: Some(info.pid),
            });
        }

        if !terminate(info.pid, self.stop_grace).await {
            warn!(pid = info.pid, "Daemon survived termination");
            return Err(DebugError::StopFailed { pid: info.pid });
        }

        self.clear_state()?;
        info!(pid = info.pid, "Daemon stopped");
        Ok(StopOutcome {
            stopped: true,
            pid: Some(info.pid),
        })
    }

    fn clear_state(&self) -> Result<()> {
        mark_stopped(&self.logs_dir)?;
        remove_pid(&self.logs_dir)
    }

    /// Launch `executable run ...` in its own session with stdio detached,
    /// so it outlives this process and the invoking terminal.
    fn spawn_daemon(&self, options: &ServerOptions) -> Result<Child> {
        std::fs::create_dir_all(&self.logs_dir)?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(server_log_path(&self.logs_dir))?;

        let base_path = if options.base_path.is_empty() {
            "/"
        } else {
            options.base_path.as_str()
        };

        let mut cmd = Command::new(&self.executable);
        cmd.arg("run")
            .arg("--host")
            .arg(&options.host)
            .arg("--port")
            .arg(options.port.to_string())
            .arg("--base-path")
            .arg(base_path)
            .arg("--logs-dir")
            .arg(&self.logs_dir)
            .arg("--max-body-kb")
            .arg(options.max_body_kb.to_string())
            .current_dir(&options.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log));

        if let Some(ttl) = options.idle_ttl_ms {
            cmd.arg("--idle-ttl-ms").arg(ttl.to_string());
        }

        // Keep the token out of the process list.
        match &options.token {
            Some(token) => cmd.env(EnvVar::Token.as_str(), token),
            None => cmd.env_remove(EnvVar::Token.as_str()),
        };

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // SAFETY: setsid is async-signal-safe and touches no parent state.
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setsid() == -1 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        Ok(cmd.spawn()?)
    }

    /// Poll until the spawned daemon has published a running descriptor.
    async fn wait_for_runtime(&self, child: &mut Child) -> Result<RuntimeInfo> {
        let pid = child.id();
        let started = Instant::now();

        while started.elapsed() < self.startup_timeout {
            if let Some(Descriptor::Current(info)) = read_runtime(&self.logs_dir) {
                if info.running && info.pid == pid {
                    debug!(pid, elapsed = ?started.elapsed(), "Runtime descriptor published");
                    return Ok(info);
                }
            }
            if let Some(status) = child.try_wait()? {
                warn!(pid, %status, "Daemon exited during start-up");
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Err(DebugError::StartFailed {
            waited_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Poll the health route until it answers 200.
    async fn wait_for_health(&self, runtime: &RuntimeInfo) -> Result<()> {
        let url = runtime.health_url();
        let client = reqwest::Client::builder()
            .timeout(HEALTH_REQUEST_TIMEOUT)
            .build()?;
        let started = Instant::now();

        while started.elapsed() < self.startup_timeout {
            match client.get(&url).send().await {
                Ok(res) if res.status() == reqwest::StatusCode::OK => return Ok(()),
                Ok(res) => debug!(status = %res.status(), "Health check not ready"),
                Err(e) => debug!(error = %e, "Health check not ready"),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Err(DebugError::HealthCheckFailed {
            url,
            waited_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Whether the descriptor claims a running daemon and its pid is still alive.
fn owner_alive(info: &RuntimeInfo) -> bool {
    info.running && is_alive(info.pid)
}
