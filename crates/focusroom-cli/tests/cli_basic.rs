//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own data directory.

use std::path::Path;
use std::process::Command;

use serde_json::Value;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_focusroom"))
        .args(args)
        .env("FOCUSROOM_DATA_DIR", dir)
        .env_remove("FOCUSROOM_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_ok(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    serde_json::from_str(&run_ok(dir, args)).expect("Failed to parse JSON output")
}

fn types(events: &Value) -> Vec<String> {
    events
        .as_array()
        .expect("event array")
        .iter()
        .map(|e| e["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn last(events: &Value) -> &Value {
    events.as_array().and_then(|a| a.last()).expect("non-empty array")
}

#[test]
fn test_config_get_default() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_ok(dir.path(), &["config", "get", "timer.focus_duration"]);
    assert_eq!(out.trim(), "1500");
    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn test_config_set_and_list() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["config", "set", "timer.long_break_interval", "2"]);
    let out = run_ok(dir.path(), &["config", "get", "timer.long_break_interval"]);
    assert_eq!(out.trim(), "2");

    let list = run_json(dir.path(), &["config", "list"]);
    assert_eq!(list["timer.long_break_interval"], "2");
    assert_eq!(list["user_id"], "local");

    run_ok(dir.path(), &["config", "reset"]);
    let out = run_ok(dir.path(), &["config", "get", "timer.long_break_interval"]);
    assert_eq!(out.trim(), "4");
}

#[test]
fn test_config_rejects_bad_input() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["config", "set", "timer.nope", "1"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "timer.focus_duration", "0"]);
    assert_eq!(code, 1);
}

#[test]
fn test_timer_status_when_idle() {
    let dir = tempfile::tempdir().unwrap();
    let events = run_json(dir.path(), &["timer", "status"]);
    let snapshot = last(&events);
    assert_eq!(snapshot["type"], "state_snapshot");
    assert_eq!(snapshot["status"], "idle");
    assert_eq!(snapshot["phase"], "focus");
    assert_eq!(snapshot["remaining_secs"], 1500);
}

#[test]
fn test_timer_start_pause_switch() {
    let dir = tempfile::tempdir().unwrap();

    let events = run_json(dir.path(), &["timer", "start", "--subject", "math"]);
    let kinds = types(&events);
    assert!(kinds.contains(&"timer_started".to_string()));
    assert!(kinds.contains(&"session_opened".to_string()));
    assert_eq!(last(&events)["status"], "running");

    // A second start neither restarts nor opens another session.
    let events = run_json(dir.path(), &["timer", "start"]);
    assert!(!types(&events).contains(&"session_opened".to_string()));

    let events = run_json(dir.path(), &["timer", "pause"]);
    let snapshot = last(&events);
    assert_eq!(snapshot["status"], "idle");
    assert!(snapshot["open_session_id"].is_string());

    let events = run_json(dir.path(), &["timer", "switch", "short-break"]);
    let kinds = types(&events);
    assert!(kinds.contains(&"phase_switched".to_string()));
    assert!(kinds.contains(&"session_closed".to_string()));
    let snapshot = last(&events);
    assert_eq!(snapshot["phase"], "short_break");
    assert_eq!(snapshot["remaining_secs"], 300);
    assert!(snapshot["open_session_id"].is_null());

    let summary = run_json(dir.path(), &["stats", "summary"]);
    assert_eq!(summary["total_sessions"], 1);
}

#[test]
fn test_timer_reset_minutes() {
    let dir = tempfile::tempdir().unwrap();
    let events = run_json(dir.path(), &["timer", "reset", "--minutes", "10"]);
    assert!(types(&events).contains(&"timer_reset".to_string()));
    assert_eq!(last(&events)["remaining_secs"], 600);
}

#[test]
fn test_timer_reset_huge_minutes_saturates() {
    let dir = tempfile::tempdir().unwrap();
    let max = u64::MAX.to_string();
    let events = run_json(dir.path(), &["timer", "reset", "--minutes", &max]);
    assert_eq!(last(&events)["remaining_secs"], u64::MAX);
}

#[test]
fn test_timer_reset_zero_minutes_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let events = run_json(dir.path(), &["timer", "reset", "--minutes", "0"]);
    assert!(!types(&events).contains(&"timer_reset".to_string()));
    assert_eq!(last(&events)["remaining_secs"], 1500);
}

#[test]
fn test_timer_skip_counts_focus() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["timer", "start"]);
    let events = run_json(dir.path(), &["timer", "skip"]);
    let switched = events
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["type"] == "phase_switched")
        .expect("phase switch");
    assert_eq!(switched["skipped"], true);
    assert_eq!(switched["to"], "short_break");
    assert_eq!(last(&events)["completed_focus"], 1);
}

#[test]
fn test_timer_run_emits_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_ok(dir.path(), &["timer", "run", "--ticks", "2"]);
    let lines: Vec<Value> = out
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(lines[0]["type"], "timer_started");
    assert_eq!(lines.last().unwrap()["type"], "state_snapshot");
}

#[test]
fn test_stats_commands() {
    let dir = tempfile::tempdir().unwrap();
    let daily = run_json(dir.path(), &["stats", "daily", "--days", "3"]);
    assert_eq!(daily.as_array().unwrap().len(), 3);

    let weekly = run_json(dir.path(), &["stats", "weekly", "--weeks", "2"]);
    assert_eq!(weekly.as_array().unwrap().len(), 2);

    let streak = run_json(dir.path(), &["stats", "streak"]);
    assert_eq!(streak["current"], 0);

    let hours = run_json(dir.path(), &["stats", "hours", "--all"]);
    assert_eq!(hours.as_array().unwrap().len(), 24);
    let productive = run_json(dir.path(), &["stats", "hours"]);
    assert!(productive.as_array().unwrap().is_empty());

    let ascii = run_ok(dir.path(), &["stats", "heatmap", "--ascii"]);
    assert!(ascii.contains("Mon"));
}

#[test]
fn test_achievements_flow() {
    let dir = tempfile::tempdir().unwrap();
    let list = run_json(dir.path(), &["achievements", "list"]);
    assert_eq!(list.as_array().unwrap().len(), 5);
    assert!(list.as_array().unwrap().iter().all(|a| a["unlocked"] == false));

    run_ok(dir.path(), &["timer", "start"]);
    run_ok(dir.path(), &["timer", "skip"]);

    let pending = run_json(dir.path(), &["achievements", "pending"]);
    let ids: Vec<&str> = pending
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u["id"].as_str())
        .collect();
    assert!(ids.contains(&"first_session"));

    run_ok(dir.path(), &["achievements", "ack", "first_session"]);
    let (_, stderr, code) = run_cli(dir.path(), &["achievements", "ack", "first_session"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not pending"));
}
