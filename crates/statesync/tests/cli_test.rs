//! Integration tests for the `statesync` CLI binary.
//!
//! Every test seeds its own in-process store from a temp file, so nothing
//! depends on the user's configuration.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use pretty_assertions::assert_eq;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `statesync` binary with env isolation.
fn statesync_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("statesync");
    cmd.env("HOME", "/tmp/statesync-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/statesync-cli-test-nonexistent")
        .env_remove("RUST_LOG")
        .env_remove("STATESYNC_CONFIG")
        .env_remove("STATESYNC_OUTPUT")
        .env_remove("STATESYNC_LOG_LEVEL")
        .env_remove("STATESYNC_LOG_JSON")
        .env_remove("STATESYNC_STORE_NAMESPACE")
        .env_remove("STATESYNC_STORE_SEED")
        .env_remove("STATESYNC_STORE_BACKLOG");
    cmd
}

fn write_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

fn seed(dir: &TempDir, doc: &Value) -> PathBuf {
    write_file(dir, "seed.json", &doc.to_string())
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = statesync_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    statesync_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("get")
            .and(predicate::str::contains("replay"))
            .and(predicate::str::contains("completions")),
    );
}

#[test]
fn test_version_flag() {
    statesync_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("statesync"));
}

#[test]
fn test_completions_zsh() {
    statesync_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_invalid_output_format() {
    let output = statesync_cmd()
        .args(["--output", "xml", "get", "x"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(combined_output(&output).contains("possible values"));
}

// ── get ─────────────────────────────────────────────────────────────

#[test]
fn test_get_prints_document_as_json() {
    let dir = TempDir::new().unwrap();
    let seed = seed(
        &dir,
        &json!({"games": {"g1": {"settings": {"title": "Friday", "maxPlayers": 8}}}}),
    );

    let output = statesync_cmd()
        .args(["--seed", arg(&seed), "-n", "games/g1", "-o", "json-compact"])
        .args(["get", "settings"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));
    let doc: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc, json!({"title": "Friday", "maxPlayers": 8}));
}

#[test]
fn test_get_table_shows_fields() {
    let dir = TempDir::new().unwrap();
    let seed = seed(&dir, &json!({"settings": {"title": "Friday"}}));

    statesync_cmd()
        .args(["--seed", arg(&seed), "get", "settings"])
        .assert()
        .success()
        .stdout(predicate::str::contains("title").and(predicate::str::contains("Friday")));
}

#[test]
fn test_get_missing_document_exits_not_found() {
    let dir = TempDir::new().unwrap();
    let seed = seed(&dir, &json!({"a": 1}));

    statesync_cmd()
        .args(["--seed", arg(&seed), "get", "b"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Nothing stored at /b"));
}

#[test]
fn test_get_rejects_illegal_path() {
    statesync_cmd()
        .args(["get", "players/a.b"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("path"));
}

#[test]
fn test_unreadable_seed_is_reported() {
    let dir = TempDir::new().unwrap();
    let seed = write_file(&dir, "seed.json", "{ not json");

    statesync_cmd()
        .args(["--seed", arg(&seed), "get", "a"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Could not load seed document"));
}

// ── replay ──────────────────────────────────────────────────────────

#[test]
fn test_replay_reports_changes_and_sorted_items() {
    let dir = TempDir::new().unwrap();
    let seed = seed(&dir, &json!({"lobby": {"players": {"a": {"score": 1}}}}));
    let script = write_file(
        &dir,
        "script.jsonl",
        "{\"key\": \"b\", \"value\": {\"score\": 5}}\n\
         {\"key\": \"a\", \"value\": {\"score\": 7}}\n\
         {\"key\": \"b\"}\n\
         {\"path\": \"players/c\", \"value\": {\"score\": 3}}\n",
    );

    let output = statesync_cmd()
        .args(["--seed", arg(&seed), "--namespace", "lobby", "-o", "json-compact"])
        .args(["replay", arg(&script), "--collection", "players"])
        .args(["--sort", "score", "--desc"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    let changes: Vec<(u64, &str, &str)> = report["changes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| {
            (
                c["step"].as_u64().unwrap(),
                c["kind"].as_str().unwrap(),
                c["key"].as_str().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        changes,
        [
            (0, "create", "a"),
            (1, "create", "b"),
            (2, "update", "a"),
            (3, "delete", "b"),
            (4, "create", "c"),
        ]
    );
    assert_eq!(
        report["items"],
        json!([
            {"key": "a", "value": {"score": 7}},
            {"key": "c", "value": {"score": 3}},
        ])
    );
}

#[test]
fn test_replay_plain_output() {
    let dir = TempDir::new().unwrap();
    let script = write_file(
        &dir,
        "script.jsonl",
        "{\"key\": \"x\", \"value\": 1}\n{\"key\": \"x\", \"value\": 2}\n",
    );

    statesync_cmd()
        .args(["-o", "plain", "--color", "never"])
        .args(["replay", arg(&script), "-c", "items", "--mode", "rebuild"])
        .assert()
        .success()
        .stdout("create x 1\nupdate x 1 -> 2\n\nx\t2\n");
}

#[test]
fn test_replay_bad_script_line_is_usage_error() {
    let dir = TempDir::new().unwrap();
    let script = write_file(&dir, "script.jsonl", "{\"key\": \"x\"}\nnot json\n");

    statesync_cmd()
        .args(["replay", arg(&script), "-c", "items"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn test_replay_requires_collection() {
    let dir = TempDir::new().unwrap();
    let script = write_file(&dir, "script.jsonl", "");

    statesync_cmd()
        .args(["replay", arg(&script)])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--collection"));
}

// ── config ──────────────────────────────────────────────────────────

#[test]
fn test_config_init_then_show() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("nested").join("config.toml");

    statesync_cmd()
        .args(["--config", arg(&config), "config", "init"])
        .assert()
        .success();
    assert!(config.exists());

    statesync_cmd()
        .args(["--config", arg(&config), "config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    statesync_cmd()
        .args(["--config", arg(&config), "-o", "json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"backlog\": 1024"));
}

#[test]
fn test_config_namespace_applies_to_get() {
    let dir = TempDir::new().unwrap();
    let seed = seed(&dir, &json!({"games": {"g7": {"phase": "lobby"}}}));
    let config = write_file(
        &dir,
        "config.toml",
        &format!(
            "[store]\nnamespace = \"games/g7\"\nseed = {:?}\n",
            arg(&seed)
        ),
    );

    statesync_cmd()
        .args(["--config", arg(&config), "-o", "plain", "get", "phase"])
        .assert()
        .success()
        .stdout("\"lobby\"\n");
}

#[test]
fn test_invalid_log_level_from_env_is_rejected() {
    statesync_cmd()
        .env("STATESYNC_LOG_LEVEL", "loud")
        .args(["get", "a"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("log.level"));
}
