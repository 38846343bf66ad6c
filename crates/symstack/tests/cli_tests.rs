use std::{fs, path::PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use tracing::info;

fn symstack() -> Command {
    symstack_common::logging::ensure_test_logging(None);
    let mut cmd = Command::cargo_bin("symstack").unwrap();
    cmd.env_remove("SYMSTACK_CONFIG");
    cmd
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const ADD_TRACE: &str = r#"[
    {"pc": 0, "op": "PUSH1", "depth": 1},
    {"pc": 2, "op": "PUSH1", "depth": 1},
    {"pc": 4, "op": "ADD", "depth": 1}
]"#;

const X_BINDING: &str = r#"[
    {"step": 2, "stackIndex": 0, "variable": {"id": 7, "name": "x", "type": "uint256"}}
]"#;

#[test]
fn test_help_command() {
    info!("Testing CLI help command");
    symstack()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Symbolic EVM stack tracker"));
}

#[test]
fn test_version_command() {
    info!("Running test");
    symstack().arg("--version").assert().success().stdout(predicate::str::contains("symstack"));
}

#[test]
fn test_replay_subcommand_help() {
    info!("Running test");
    symstack()
        .arg("replay")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Replay a trace file"));
}

#[test]
fn test_missing_subcommand() {
    info!("Running test");
    symstack().assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_opcode_command() {
    info!("Running test");
    symstack()
        .args(["opcode", "add", "dup3", "sha3", "bogus"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ADD            pops  2  pushes  1"))
        .stdout(predicate::str::contains("DUP3           pops  0  pushes  1"))
        .stdout(predicate::str::contains("KECCAK256      pops  2  pushes  1"))
        .stdout(predicate::str::contains("bogus          unknown opcode"));
}

#[test]
fn test_replay_with_bindings_text() {
    info!("Running test");
    let dir = TempDir::new().unwrap();
    let trace = write_file(&dir, "trace.json", ADD_TRACE);
    let bindings = write_file(&dir, "bindings.json", X_BINDING);

    symstack()
        .arg("replay")
        .arg(&trace)
        .arg("--bindings")
        .arg(&bindings)
        .assert()
        .success()
        .stdout(predicate::str::contains("step    2  ADD            depth 1"))
        .stdout(predicate::str::contains("x: uint256 [variable, declared]"))
        .stderr(predicate::str::contains("replayed 3 steps, 0 with diagnostics"));
}

#[test]
fn test_replay_single_step_json() {
    info!("Running test");
    let dir = TempDir::new().unwrap();
    let trace = write_file(&dir, "trace.json", ADD_TRACE);

    let output = symstack()
        .arg("replay")
        .arg(&trace)
        .args(["--step", "1", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["step"], 1);
    assert_eq!(value["pc"], 2);
    assert_eq!(value["stack"].as_array().unwrap().len(), 2);
}

#[test]
fn test_replay_struct_logs_file() {
    info!("Running test");
    let dir = TempDir::new().unwrap();
    let trace = write_file(
        &dir,
        "trace.json",
        r#"{"structLogs": [{"pc": 0, "op": "CALLER"}, {"pc": 1, "op": "DUP1"}]}"#,
    );

    symstack()
        .arg("replay")
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("step    1  DUP1           depth 2"));
}

#[test]
fn test_replay_reports_diagnostics_without_failing() {
    info!("Running test");
    let dir = TempDir::new().unwrap();
    let trace = write_file(&dir, "trace.json", r#"[{"op": "POP"}, {"op": "FROBNICATE"}]"#);

    symstack()
        .arg("replay")
        .arg(&trace)
        .assert()
        .success()
        .stderr(predicate::str::contains("replayed 2 steps, 2 with diagnostics"))
        .stderr(predicate::str::contains("stack_underflow: 1"))
        .stderr(predicate::str::contains("unknown_opcode: 1"));
}

#[test]
fn test_replay_with_config_file() {
    info!("Running test");
    let dir = TempDir::new().unwrap();
    let trace = write_file(&dir, "trace.json", ADD_TRACE);
    let config = write_file(&dir, "symstack.toml", "max_stack_depth = 1\n");

    symstack()
        .arg("--config")
        .arg(&config)
        .arg("replay")
        .arg(&trace)
        .assert()
        .success()
        .stderr(predicate::str::contains("stack_overflow: 1"));
}

#[test]
fn test_replay_step_out_of_range() {
    info!("Running test");
    let dir = TempDir::new().unwrap();
    let trace = write_file(&dir, "trace.json", ADD_TRACE);

    symstack()
        .arg("replay")
        .arg(&trace)
        .args(["--step", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn test_replay_missing_trace_file() {
    info!("Running test");
    symstack()
        .arg("replay")
        .arg("/nonexistent/trace.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read trace file"));
}
