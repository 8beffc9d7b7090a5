#![cfg(unix)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PROPOSAL: &str = r#"{"steps":[
    {"description":"Resolve the ticker","agent":"company"},
    {"description":"Pull fundamentals","agent":"fundamentals","depends_on":[0]},
    {"description":"Write the summary","agent":"summarizer","depends_on":[1]}]}"#;

struct TestEnv {
    _temp_dir: TempDir,
    db_path: PathBuf,
    proposal: PathBuf,
}

/// Temporary database plus a canned proposal file
fn create_cli_test_environment() -> TestEnv {
    let temp_dir = TempDir::new().expect("Failed to create temporary directory");
    let db_path = temp_dir.path().join("cli_test.db");
    let proposal = temp_dir.path().join("proposal.json");
    std::fs::write(&proposal, PROPOSAL).expect("Failed to write proposal");
    TestEnv {
        _temp_dir: temp_dir,
        db_path,
        proposal,
    }
}

/// `sw --no-color --database-file DB` with `cat` registered for every agent
fn sw_cmd(db_path: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sw").expect("Failed to find sw binary");
    cmd.args(["--no-color", "--database-file", db_path.to_str().unwrap()]);
    for agent in ["company", "fundamentals", "summarizer"] {
        cmd.args(["--agent", &format!("{agent}=cat")]);
    }
    cmd
}

fn create_plan(env: &TestEnv) {
    sw_cmd(&env.db_path)
        .args(["plan", "create", "Analyze AAPL", "--proposal"])
        .arg(&env.proposal)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created plan with ID: 1"));
}

#[test]
fn test_cli_create_and_show_plan() {
    let env = create_cli_test_environment();
    create_plan(&env);

    sw_cmd(&env.db_path)
        .args(["plan", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# 1. Analyze AAPL"))
        .stdout(predicate::str::contains("Status: PENDING_APPROVAL"))
        .stdout(predicate::str::contains("Resolve the ticker"))
        .stdout(predicate::str::contains("Write the summary"));
}

#[test]
fn test_cli_create_with_planner_program() {
    let env = create_cli_test_environment();
    let planner = format!("cat {}", env.proposal.display());

    sw_cmd(&env.db_path)
        .args(["--planner", &planner, "plan", "create", "Analyze AAPL"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created plan with ID: 1"));
}

#[test]
fn test_cli_create_without_planner_fails() {
    let env = create_cli_test_environment();

    sw_cmd(&env.db_path)
        .args(["plan", "create", "Analyze AAPL"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no plan proposer configured"));
}

#[test]
fn test_cli_create_with_unknown_agent_fails() {
    let env = create_cli_test_environment();

    Command::cargo_bin("sw")
        .expect("Failed to find sw binary")
        .args(["--no-color", "--database-file", env.db_path.to_str().unwrap()])
        .args(["--agent", "company=cat", "plan", "create", "Analyze AAPL", "--proposal"])
        .arg(&env.proposal)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to create plan"));
}

#[test]
fn test_cli_rejects_malformed_agent_flag() {
    let env = create_cli_test_environment();

    sw_cmd(&env.db_path)
        .args(["--agent", "company", "plan", "show", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NAME=PROGRAM"));
}

#[test]
fn test_cli_approve_execute_and_inspect() {
    let env = create_cli_test_environment();
    create_plan(&env);

    sw_cmd(&env.db_path)
        .args(["step", "approve", "1", "--feedback", "use NASDAQ"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Approved step with ID: 1"));

    sw_cmd(&env.db_path)
        .args(["plan", "execute", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("step 1 started (company)"))
        .stdout(predicate::str::contains("Plan 1 is IN_PROGRESS"))
        .stdout(predicate::str::contains("Executed steps: 1"));

    sw_cmd(&env.db_path)
        .args(["plan", "status", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Progress: 1/3"));

    // `cat` echoes the request, so the message carries the task.
    sw_cmd(&env.db_path)
        .args(["plan", "messages", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("**company**"))
        .stdout(predicate::str::contains("Resolve the ticker"));
}

#[test]
fn test_cli_sequential_execution() {
    let env = create_cli_test_environment();
    create_plan(&env);

    // Each approval unlocks the next step once its dependency completed.
    for step in ["1", "2", "3"] {
        sw_cmd(&env.db_path)
            .args(["step", "approve", step])
            .assert()
            .success();
        sw_cmd(&env.db_path)
            .args(["plan", "execute", "1", "--mode", "sequential"])
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("Executed steps: {step}")));
    }

    sw_cmd(&env.db_path)
        .args(["plan", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: COMPLETED"))
        .stdout(predicate::str::contains("## Summary"));
}

#[test]
fn test_cli_approval_needs_completed_dependencies() {
    let env = create_cli_test_environment();
    create_plan(&env);

    sw_cmd(&env.db_path)
        .args(["step", "approve", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to approve step 2"));
}

#[test]
fn test_cli_reject_skips_dependents() {
    let env = create_cli_test_environment();
    create_plan(&env);

    sw_cmd(&env.db_path)
        .args(["step", "reject", "1", "--reason", "wrong ticker"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rejected step with ID: 1"));

    sw_cmd(&env.db_path)
        .args(["plan", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("COMPLETED_WITH_SKIPS"))
        .stdout(predicate::str::contains("SKIPPED"));

    sw_cmd(&env.db_path)
        .args(["step", "approve", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to approve step 2"));
}

#[test]
fn test_cli_reject_requires_reason() {
    let env = create_cli_test_environment();
    create_plan(&env);

    sw_cmd(&env.db_path)
        .args(["step", "reject", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--reason"));
}

#[test]
fn test_cli_cancel_plan() {
    let env = create_cli_test_environment();
    create_plan(&env);

    sw_cmd(&env.db_path)
        .args(["plan", "cancel", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cancellation requested for plan 1"));

    sw_cmd(&env.db_path)
        .args(["plan", "status", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cancellation requested"));
}

#[test]
fn test_cli_unknown_plan() {
    let env = create_cli_test_environment();

    sw_cmd(&env.db_path)
        .args(["plan", "show", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Plan with ID 99 not found"));

    sw_cmd(&env.db_path)
        .args(["plan", "status", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Plan with ID 99 not found"));
}

#[test]
fn test_cli_plans_are_session_scoped() {
    let env = create_cli_test_environment();
    create_plan(&env);

    sw_cmd(&env.db_path)
        .args(["--session", "other", "plan", "show", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Plan with ID 1 not found"));
}

#[test]
fn test_cli_delete_session() {
    let env = create_cli_test_environment();
    create_plan(&env);

    sw_cmd(&env.db_path)
        .args(["session", "delete", "default"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--confirm"));

    sw_cmd(&env.db_path)
        .args(["session", "delete", "default", "--confirm"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Deleted session 'default': 1 plan(s), 3 step(s)",
        ));

    sw_cmd(&env.db_path)
        .args(["plan", "show", "1"])
        .assert()
        .failure();
}
