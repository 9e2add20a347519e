//! Runtime descriptor and pid marker persistence.
//!
//! `runtime.json` is the only authoritative record of whether a daemon is
//! supposed to be running for a logs directory and where it listens.
//! `server.pid` is an advisory copy of the owning pid.

use super::paths::{pid_path, runtime_path};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub ok: bool,
    pub version: String,
    pub pid: u32,
    pub cwd: PathBuf,
    pub logs_dir: PathBuf,
    pub running: bool,
    pub server: ServerInfo,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
    pub options: RuntimeOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
    pub base_url: String,
    pub base_path: String,
    pub endpoints: Endpoints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    pub health: String,
    pub ingest_template: String,
}

impl Endpoints {
    pub fn for_base_path(base_path: &str) -> Self {
        Self {
            health: format!("{base_path}/health"),
            ingest_template: format!("{base_path}/ingest/{{streamId}}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOptions {
    #[serde(rename = "maxBodyKB")]
    pub max_body_kb: u64,
    pub token_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_ttl_ms: Option<u64>,
}

impl RuntimeInfo {
    /// Absolute URL of the health route.
    pub fn health_url(&self) -> String {
        format!("{}{}", self.server.base_url, self.server.endpoints.health)
    }

    /// Absolute URL template of the ingest route, `{streamId}` left in place.
    pub fn ingest_url_template(&self) -> String {
        format!(
            "{}{}",
            self.server.base_url, self.server.endpoints.ingest_template
        )
    }
}

/// What `runtime.json` holds, when it holds anything readable.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Current(RuntimeInfo),
    /// A descriptor written before `options` existed. Never interpreted.
    Legacy,
}

/// Read the descriptor. Missing or malformed files read as `None`.
pub fn read_runtime(logs_dir: &Path) -> Option<Descriptor> {
    let path = runtime_path(logs_dir);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) => {
            trace!(path = %path.display(), error = %e, "No runtime descriptor");
            return None;
        }
    };

    let value: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed runtime descriptor");
            return None;
        }
    };

    let object = value.as_object()?;
    if !object.contains_key("options") {
        debug!(path = %path.display(), "Runtime descriptor is in legacy format");
        return Some(Descriptor::Legacy);
    }

    match serde_json::from_value(value) {
        Ok(info) => Some(Descriptor::Current(info)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable runtime descriptor");
            None
        }
    }
}

/// Write the descriptor through a temp file and rename, so readers see
/// either the old or the new file in full.
pub fn write_runtime(logs_dir: &Path, info: &RuntimeInfo) -> Result<()> {
    fs::create_dir_all(logs_dir)?;
    let path = runtime_path(logs_dir);
    let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
    let content = serde_json::to_string_pretty(info)?;
    fs::write(&tmp, content)?;
    if let Err(e) = fs::rename(&tmp, &path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    trace!(
        path = %path.display(),
        pid = info.pid,
        running = info.running,
        "Runtime descriptor written"
    );
    Ok(())
}

/// Flip the descriptor to `running=false` and stamp `stoppedAt`.
/// No-op when there is no current-format descriptor.
pub fn mark_stopped(logs_dir: &Path) -> Result<()> {
    let Some(Descriptor::Current(mut info)) = read_runtime(logs_dir) else {
        return Ok(());
    };
    info.running = false;
    info.stopped_at = Some(Utc::now());
    write_runtime(logs_dir, &info)?;
    debug!(pid = info.pid, "Runtime descriptor marked stopped");
    Ok(())
}

pub fn write_pid(logs_dir: &Path, pid: u32) -> Result<()> {
    fs::create_dir_all(logs_dir)?;
    fs::write(pid_path(logs_dir), pid.to_string())?;
    Ok(())
}

pub fn read_pid(logs_dir: &Path) -> Option<u32> {
    fs::read_to_string(pid_path(logs_dir))
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
}

/// Remove the pid marker. A missing marker is not an error.
pub fn remove_pid(logs_dir: &Path) -> Result<()> {
    match fs::remove_file(pid_path(logs_dir)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_runtime(logs_dir: &Path, pid: u32) -> RuntimeInfo {
        RuntimeInfo {
            ok: true,
            version: "0.0.0-test".into(),
            pid,
            cwd: logs_dir.to_path_buf(),
            logs_dir: logs_dir.to_path_buf(),
            running: true,
            server: ServerInfo {
                host: "127.0.0.1".into(),
                port: 4567,
                base_url: "http://127.0.0.1:4567".into(),
                base_path: String::new(),
                endpoints: Endpoints::for_base_path(""),
            },
            started_at: Utc::now(),
            stopped_at: None,
            options: RuntimeOptions {
                max_body_kb: 64,
                token_enabled: false,
                idle_ttl_ms: None,
            },
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let info = sample_runtime(dir.path(), 4242);
        write_runtime(dir.path(), &info).unwrap();

        assert_eq!(read_runtime(dir.path()), Some(Descriptor::Current(info)));
    }

    #[test]
    fn serialized_keys_are_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let mut info = sample_runtime(dir.path(), 1);
        info.options.idle_ttl_ms = Some(5000);
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["options"]["maxBodyKB"], 64);
        assert_eq!(json["options"]["tokenEnabled"], false);
        assert_eq!(json["options"]["idleTtlMs"], 5000);
        assert_eq!(json["server"]["endpoints"]["ingestTemplate"], "/ingest/{streamId}");
        assert!(json.get("logsDir").is_some());
        assert!(json.get("startedAt").is_some());
        assert!(json.get("stoppedAt").is_none());
    }

    #[test]
    fn missing_and_malformed_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_runtime(dir.path()), None);

        fs::write(runtime_path(dir.path()), "{not json").unwrap();
        assert_eq!(read_runtime(dir.path()), None);
    }

    #[test]
    fn descriptor_without_options_is_legacy() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            runtime_path(dir.path()),
            r#"{"ok":true,"pid":12,"port":9000,"running":true}"#,
        )
        .unwrap();
        assert_eq!(read_runtime(dir.path()), Some(Descriptor::Legacy));
    }

    #[test]
    fn mark_stopped_only_touches_running_and_stopped_at() {
        let dir = tempfile::tempdir().unwrap();
        let info = sample_runtime(dir.path(), 77);
        write_runtime(dir.path(), &info).unwrap();

        mark_stopped(dir.path()).unwrap();

        let Some(Descriptor::Current(stopped)) = read_runtime(dir.path()) else {
            panic!("descriptor should still be readable");
        };
        assert!(!stopped.running);
        assert!(stopped.stopped_at.is_some());
        assert_eq!(
            RuntimeInfo {
                running: true,
                stopped_at: None,
                ..stopped
            },
            info
        );
    }

    #[test]
    fn mark_stopped_without_descriptor_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        mark_stopped(dir.path()).unwrap();
        assert!(!runtime_path(dir.path()).exists());
    }

    #[test]
    fn pid_marker_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested");
        write_pid(&logs, 31337).unwrap();
        assert_eq!(read_pid(&logs), Some(31337));

        remove_pid(&logs).unwrap();
        assert_eq!(read_pid(&logs), None);
        remove_pid(&logs).unwrap();
    }
}
