use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn run(data_dir: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_profile-tool");
    Command::new(exe)
        .arg("--config")
        .arg(data_dir.join("missing.toml"))
        .arg("--data-dir")
        .arg(data_dir)
        .args(args)
        .output()
        .expect("failed to run profile-tool")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

#[test]
fn show_creates_default_profile() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let output = run(dir.path(), &["show"]);

    assert!(output.status.success());
    let profile = stdout_json(&output);
    assert_eq!(profile["coins"], 100);
    assert_eq!(profile["dataVersion"], 4);
    assert!(dir.path().join("user_profile.json").exists());
}

#[test]
fn mutations_persist_between_runs() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    assert!(run(dir.path(), &["add-coins", "25"]).status.success());
    assert!(run(dir.path(), &["record-game", "300", "--won", "--seconds", "42"])
        .status
        .success());
    assert!(run(dir.path(), &["unlock", "first_win"]).status.success());

    let output = run(dir.path(), &["show"]);
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 games played, win rate 100.0%"));
    let profile = stdout_json(&output);
    assert_eq!(profile["coins"], 125);
    assert_eq!(profile["gameStats"]["wins"], 1);
    assert_eq!(profile["achievements"][0], "first_win");
}

#[test]
fn overdraw_is_rejected() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let output = run(dir.path(), &["add-coins", "-500"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("add coins failed: validation"));
}

#[test]
fn inspect_prints_decrypted_blob() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    assert!(run(dir.path(), &["rename", "Ada"]).status.success());

    let raw = std::fs::read(dir.path().join("user_profile.json")).expect("read");
    assert!(raw.starts_with(b"PVE1"));

    let output = run(dir.path(), &["inspect"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["nickname"], "Ada");
}
