use std::path::{Path, PathBuf};

const RUNTIME_FILE: &str = "runtime.json";
const PID_FILE: &str = "server.pid";
const SERVER_LOG_FILE: &str = "server.log";
const UNKNOWN_SEGMENT: &str = "unknown";

pub fn runtime_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(RUNTIME_FILE)
}

pub fn pid_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(PID_FILE)
}

/// Where the detached daemon's stderr goes.
pub fn server_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join(SERVER_LOG_FILE)
}

/// `<logs>/<session>-<run>.jsonl`, both ids sanitized.
pub fn session_log_path(logs_dir: &Path, session_id: &str, run_id: &str) -> PathBuf {
    let session = sanitize_path_segment(session_id);
    let run = sanitize_path_segment(run_id);
    logs_dir.join(format!("{session}-{run}.jsonl"))
}

/// Make a client-supplied id safe to use as one file name component.
///
/// Path separators become `_`, every `..` becomes `_`, and an empty result
/// falls back to `unknown`.
pub fn sanitize_path_segment(value: &str) -> String {
    let replaced = value.replace(['/', '\\'], "_").replace("..", "_");
    let trimmed = replaced.trim();
    if trimmed.is_empty() {
        UNKNOWN_SEGMENT.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_and_traversal_are_neutralized() {
        assert_eq!(sanitize_path_segment("../../etc/passwd"), "____etc_passwd");
        assert_eq!(sanitize_path_segment("a\\b"), "a_b");
        assert_eq!(sanitize_path_segment("..."), "_.");
    }

    #[test]
    fn empty_or_blank_falls_back() {
        assert_eq!(sanitize_path_segment(""), "unknown");
        assert_eq!(sanitize_path_segment("   "), "unknown");
    }

    #[test]
    fn session_log_stays_inside_logs_dir() {
        let logs = Path::new("/tmp/logs");
        let path = session_log_path(logs, "../../x", "/abs");
        assert_eq!(path.parent(), Some(logs));
        assert_eq!(path, logs.join("____x-_abs.jsonl"));
    }

    #[test]
    fn plain_ids_are_untouched() {
        let path = session_log_path(Path::new("/l"), "session-1", "run-1");
        assert_eq!(path, PathBuf::from("/l/session-1-run-1.jsonl"));
    }
}
