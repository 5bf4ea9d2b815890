//! CLI tests for `canvas apply`, `show`, `reset`, and `validate`.
//!
//! Spawns the canvas binary and checks stdout snapshot lines and exit codes.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use canvas::core::types::SharedState;
use canvas::exit_codes;
use canvas::io::init::{CanvasPaths, InitOptions, init_canvas};
use serde_json::{Value, json};

fn canvas(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_canvas"))
        .current_dir(root)
        .args(args)
        .output()
        .expect("run canvas")
}

fn stdout_lines(output: &Output) -> Vec<Value> {
    String::from_utf8(output.stdout.clone())
        .expect("utf8 stdout")
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

fn write_json(path: &Path, value: &Value) {
    fs::write(path, serde_json::to_string(value).expect("serialize")).expect("write json");
}

#[test]
fn apply_prints_snapshots_then_outcomes() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_canvas(temp.path(), &InitOptions { force: false }).expect("init");
    let calls = temp.path().join("calls.json");
    write_json(
        &calls,
        &json!([
            {"name": "set_plan", "args": {"steps": ["a", "b"]}},
            {"name": "createItem", "args": {"type": "note", "name": "Ideas"}},
        ]),
    );

    let output = canvas(
        temp.path(),
        &["apply", "--session", "demo", "--calls", "calls.json"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["session"], "demo");
    assert_eq!(lines[0]["revision"], 1);
    assert_eq!(lines[1]["snapshot"]["items"][0]["name"], "Ideas");
    assert_eq!(lines[2][0]["applied"], true);
    assert_eq!(lines[2][1]["result"]["id"], "0001");

    let session_file = CanvasPaths::new(temp.path()).sessions_dir.join("demo.json");
    let persisted: SharedState =
        serde_json::from_str(&fs::read_to_string(session_file).expect("read")).expect("parse");
    assert_eq!(persisted.items.len(), 1);
    assert_eq!(persisted.plan.steps.len(), 2);
}

/// Rejected calls are reported in the outcomes and flip the exit code.
#[test]
fn apply_with_rejection_exits_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_canvas(temp.path(), &InitOptions { force: false }).expect("init");
    write_json(
        &temp.path().join("calls.json"),
        &json!([{"name": "AdvanceStep", "args": {"index": 5, "status": "completed"}}]),
    );
    write_json(
        &temp.path().join("state.json"),
        &json!({
            "items": [],
            "planSteps": [{"title": "a", "status": "in_progress"}],
            "currentStepIndex": 0,
            "planStatus": "in_progress",
        }),
    );

    let output = canvas(
        temp.path(),
        &[
            "apply",
            "--session",
            "demo",
            "--calls",
            "calls.json",
            "--state",
            "state.json",
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::REJECTED));

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0][0]["applied"], false);
    assert_eq!(lines[0][0]["result"]["updated"], false);
    assert_eq!(lines[0][0]["result"]["error"], "out_of_range");
}

#[test]
fn invalid_session_key_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_canvas(temp.path(), &InitOptions { force: false }).expect("init");
    let output = canvas(temp.path(), &["show", "--session", "../escape"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn show_and_reset_round_trip() {
    let temp = tempfile::tempdir().expect("tempdir");
    init_canvas(temp.path(), &InitOptions { force: false }).expect("init");
    write_json(
        &temp.path().join("calls.json"),
        &json!([{"name": "setGlobalTitle", "args": {"title": "Roadmap"}}]),
    );
    let applied = canvas(
        temp.path(),
        &["apply", "--session", "demo", "--calls", "calls.json"],
    );
    assert_eq!(applied.status.code(), Some(exit_codes::OK));

    let shown = canvas(temp.path(), &["show", "--session", "demo"]);
    let state: Value = serde_json::from_slice(&shown.stdout).expect("state json");
    assert_eq!(state["globalTitle"], "Roadmap");

    let reset = canvas(temp.path(), &["reset", "--session", "demo"]);
    assert_eq!(reset.status.code(), Some(exit_codes::OK));
    let lines = stdout_lines(&reset);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["snapshot"]["globalTitle"], "");

    let shown = canvas(temp.path(), &["show", "--session", "demo"]);
    let state: SharedState = serde_json::from_slice(&shown.stdout).expect("state json");
    assert_eq!(state, SharedState::initial());
}

#[test]
fn validate_flags_inconsistent_sessions() {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = init_canvas(temp.path(), &InitOptions { force: false }).expect("init");
    write_json(
        &paths.sessions_dir.join("demo.json"),
        &json!({
            "items": [],
            "planSteps": [{"title": "a", "status": "failed"}],
            "currentStepIndex": 0,
            "planStatus": "completed",
        }),
    );

    let output = canvas(temp.path(), &["validate", "--session", "demo"]);
    assert_eq!(output.status.code(), Some(exit_codes::INCONSISTENT));
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    assert!(stdout.contains("disagrees with step statuses"));

    let missing = canvas(temp.path(), &["validate", "--session", "other"]);
    assert_eq!(missing.status.code(), Some(exit_codes::OK));
}
