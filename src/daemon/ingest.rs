//! Debug event normalization and session log appends.
//!
//! Required-field policy is lenient: a missing `timestamp` becomes the
//! receive time in epoch milliseconds and the other logical fields become
//! empty strings. Client values always win, so no event is ever dropped for
//! being incomplete.

use super::paths::session_log_path;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Fields every stored event carries.
pub const LOG_FIELDS: [&str; 5] = ["timestamp", "message", "sessionId", "runId", "hypothesisId"];

/// An event ready to be appended, with the ids used to route it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedEvent {
    pub record: Map<String, Value>,
    pub session_id: String,
    pub run_id: String,
}

impl PreparedEvent {
    /// Fill defaults, keep client values, and attach `_meta`.
    pub fn new(event: Map<String, Value>, stream_id: &str, received_at_ms: i64) -> Self {
        let session_id = event.get("sessionId").map(id_string).unwrap_or_default();
        let run_id = event.get("runId").map(id_string).unwrap_or_default();

        let mut record = Map::new();
        record.insert("timestamp".into(), json!(received_at_ms));
        for field in &LOG_FIELDS[1..] {
            record.insert((*field).into(), Value::String(String::new()));
        }
        record.extend(event.into_iter().filter(|(key, _)| key != "_meta"));
        record.insert(
            "_meta".into(),
            json!({ "streamId": stream_id, "receivedAt": received_at_ms }),
        );

        Self {
            record,
            session_id,
            run_id,
        }
    }

    pub fn log_path(&self, logs_dir: &Path) -> PathBuf {
        session_log_path(logs_dir, &self.session_id, &self.run_id)
    }

    /// The record as one newline-terminated JSON line.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(&self.record)?;
        line.push('\n');
        Ok(line)
    }
}

/// Strings are used verbatim; any other JSON value by its JSON text.
fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Append `line` to `path` with one write on an `O_APPEND` descriptor, so
/// concurrent writers to the same file never interleave within a line.
/// The parent directory is created on first use.
pub async fn append_line(path: PathBuf, line: String) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        file.write_all(line.as_bytes())
    })
    .await
    .map_err(std::io::Error::other)?
}
