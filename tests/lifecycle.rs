//! End-to-end lifecycle of the background collector through the CLI.
//!
//! Run with: cargo test --test lifecycle

#![cfg(unix)]

mod helpers;

use helpers::{parse_stdout, read_json, wait_until, Workspace};
use serde_json::json;
use std::time::Duration;

fn pid_of(value: &serde_json::Value) -> u32 {
    value["pid"].as_u64().expect("pid") as u32
}

#[tokio::test]
async fn start_ingest_status_stop() {
    let ws = Workspace::new();

    let started = ws.json(&["start"]);
    assert_eq!(started["ok"], true);
    assert_eq!(started["existing"], false);
    assert_eq!(started["spawnedPid"], started["pid"]);
    let pid = pid_of(&started);
    let base_url = started["server"]["baseUrl"].as_str().unwrap().to_string();
    assert!(started["snippets"]["jsFetch"]
        .as_str()
        .unwrap()
        .contains("/ingest/{streamId}"));

    let runtime = ws.read_runtime();
    assert_eq!(runtime["running"], true);
    assert_eq!(pid_of(&runtime), pid);
    assert_eq!(
        std::fs::read_to_string(ws.pid_path()).unwrap().trim(),
        pid.to_string()
    );

    let client = reqwest::Client::new();
    let health = client.get(format!("{base_url}/health")).send().await.unwrap();
    assert_eq!(health.status(), reqwest::StatusCode::OK);

    let res = client
        .post(format!("{base_url}/ingest/browser"))
        .json(&json!({
            "timestamp": 1,
            "message": "enter: checkout()",
            "sessionId": "s1",
            "runId": "r1",
            "hypothesisId": "H1",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    let log = std::fs::read_to_string(ws.logs_dir().join("s1-r1.jsonl")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("\"streamId\":\"browser\""));

    let status = ws.json(&["status"]);
    assert_eq!(status["running"], true);
    assert_eq!(pid_of(&status["runtime"]), pid);

    let stopped = ws.json(&["stop"]);
    assert_eq!(stopped["stopped"], true);
    assert_eq!(pid_of(&stopped), pid);
    assert!(!ws.pid_path().exists());

    let runtime = ws.read_runtime();
    assert_eq!(runtime["running"], false);
    assert!(runtime["stoppedAt"].is_string());
    assert!(wait_until(Duration::from_secs(2), || !helpers::process_exists(pid)));

    assert_eq!(ws.json(&["status"])["running"], false);
}

#[test]
fn second_start_reuses_running_daemon() {
    let ws = Workspace::new();

    let first = ws.json(&["start"]);
    let second = ws.json(&["start"]);

    assert_eq!(second["existing"], true);
    assert!(second["spawnedPid"].is_null());
    assert_eq!(pid_of(&second), pid_of(&first));
    assert_eq!(second["server"]["port"], first["server"]["port"]);
}

#[test]
fn forced_start_replaces_running_daemon() {
    let ws = Workspace::new();

    let first = ws.json(&["start"]);
    let second = ws.json(&["start", "--force"]);

    assert_eq!(second["existing"], false);
    assert_ne!(pid_of(&second), pid_of(&first));
    assert!(wait_until(Duration::from_secs(2), || {
        !helpers::process_exists(pid_of(&first))
    }));
    assert_eq!(pid_of(&ws.read_runtime()), pid_of(&second));
}

#[test]
fn status_notices_out_of_band_kill() {
    let ws = Workspace::new();
    let pid = pid_of(&ws.json(&["start"]));

    // SAFETY: pid belongs to the daemon this test just started.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }

    assert!(wait_until(Duration::from_secs(3), || {
        ws.json(&["status"])["running"] == false
    }));
    // Nothing cleaned up after the crash.
    assert_eq!(ws.read_runtime()["running"], true);

    let stopped = ws.json(&["stop"]);
    assert_eq!(stopped["ok"], true);
    assert_eq!(read_json(&ws.runtime_path())["running"], false);
    assert!(!ws.pid_path().exists());

    // A fresh start replaces the stale state.
    let restarted = ws.json(&["start"]);
    assert_eq!(restarted["existing"], false);
    assert_ne!(pid_of(&restarted), pid);
}

#[test]
fn stop_and_status_without_start() {
    let ws = Workspace::new();

    let stopped = ws.json(&["stop"]);
    assert_eq!(stopped["ok"], true);
    assert_eq!(stopped["stopped"], false);

    let status = ws.json(&["status"]);
    assert_eq!(status["running"], false);
    assert!(status["runtime"].is_null());
}

#[test]
fn legacy_descriptor_is_reported_not_touched() {
    let ws = Workspace::new();
    std::fs::create_dir_all(ws.logs_dir()).unwrap();
    let legacy = r#"{"ok":true,"pid":1,"port":7777}"#;
    std::fs::write(ws.runtime_path(), legacy).unwrap();

    for command in ["start", "status", "stop"] {
        let output = ws.run(&[command]);
        assert_eq!(output.status.code(), Some(1), "{command} should fail");
        let body = parse_stdout(&output);
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"], "legacy_runtime_incompatible");
        assert!(body["hint"].as_str().unwrap().contains("runtime.json"));
    }

    assert_eq!(std::fs::read_to_string(ws.runtime_path()).unwrap(), legacy);
    // Leave nothing for the drop guard to stop.
    std::fs::remove_file(ws.runtime_path()).unwrap();
}
