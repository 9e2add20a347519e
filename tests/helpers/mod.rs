//! Drives the compiled `debugsk` binary against a scratch directory.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const ENV_VARS: [&str; 8] = [
    "DEBUGSK_CONFIG_DIR",
    "DEBUGSK_HOST",
    "DEBUGSK_PORT",
    "DEBUGSK_BASE_PATH",
    "DEBUGSK_LOGS_DIR",
    "DEBUGSK_MAX_BODY_KB",
    "DEBUGSK_TOKEN",
    "DEBUGSK_IDLE_TTL_MS",
];

/// A scratch working directory whose collector is stopped on drop.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.dir.path().join(".logs")
    }

    pub fn runtime_path(&self) -> PathBuf {
        self.logs_dir().join("runtime.json")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.logs_dir().join("server.pid")
    }

    /// Run `debugsk --json <args> --logs-dir <logs>` with a clean environment.
    pub fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_debugsk"));
        cmd.arg("--json")
            .args(args)
            .arg("--logs-dir")
            .arg(self.logs_dir())
            .current_dir(self.dir.path());
        for var in ENV_VARS {
            cmd.env_remove(var);
        }
        // Keep the user's own config file out of the picture.
        cmd.env("DEBUGSK_CONFIG_DIR", self.dir.path().join("config"));
        cmd.output().expect("run debugsk")
    }

    /// Run a command that must succeed and return its JSON output.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "debugsk {args:?} failed: stdout={} stderr={}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        parse_stdout(&output)
    }

    pub fn read_runtime(&self) -> Value {
        read_json(&self.runtime_path())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.runtime_path().exists() {
            let _ = self.run(&["stop"]);
        }
    }
}

pub fn parse_stdout(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).unwrap_or_else(|e| panic!("bad JSON {stdout:?}: {e}"))
}

pub fn read_json(path: &Path) -> Value {
    let content = std::fs::read_to_string(path).expect("read json file");
    serde_json::from_str(&content).expect("parse json file")
}

/// Poll `check` every 50ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    check()
}

/// Liveness as the controller sees it, so zombies count as gone.
pub fn process_exists(pid: u32) -> bool {
    debugsk::daemon::process::is_alive(pid)
}
