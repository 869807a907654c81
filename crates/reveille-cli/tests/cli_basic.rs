//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs. Each test
//! points HOME at its own temp dir so the data directory starts empty.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "reveille-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env_remove("REVEILLE_ENV")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_cli_success(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "CLI command failed: {args:?}\n{stderr}");
    stdout
}

fn list_alarms(home: &Path) -> Vec<serde_json::Value> {
    let out = run_cli_success(home, &["alarm", "list", "--json"]);
    serde_json::from_str(&out).expect("alarm list --json prints a JSON array")
}

fn created_id(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("Alarm created: "))
        .expect("create prints the new id")
        .trim()
        .to_string()
}

#[test]
fn test_alarm_lifecycle() {
    let home = tempfile::tempdir().unwrap();
    assert!(list_alarms(home.path()).is_empty());

    let out = run_cli_success(
        home.path(),
        &["alarm", "add", "--time", "07:30", "--days", "1,2,3,4,5", "--strict", "--difficulty", "hard"],
    );
    let id = created_id(&out);

    let alarms = list_alarms(home.path());
    assert_eq!(alarms.len(), 1);
    assert_eq!(alarms[0]["time"], "07:30");
    assert_eq!(alarms[0]["days"], serde_json::json!([1, 2, 3, 4, 5]));
    assert_eq!(alarms[0]["strict"], true);
    assert_eq!(alarms[0]["enabled"], true);

    run_cli_success(home.path(), &["alarm", "disable", &id]);
    assert_eq!(list_alarms(home.path())[0]["enabled"], false);
    run_cli_success(home.path(), &["alarm", "toggle", &id]);
    assert_eq!(list_alarms(home.path())[0]["enabled"], true);

    run_cli_success(home.path(), &["alarm", "edit", &id, "--time", "06:45", "--label", "Gym"]);
    let edited = &list_alarms(home.path())[0];
    assert_eq!(edited["time"], "06:45");
    assert_eq!(edited["label"], "Gym");
    assert_eq!(edited["difficulty"], "hard");

    run_cli_success(home.path(), &["alarm", "remove", &id]);
    assert!(list_alarms(home.path()).is_empty());
}

#[test]
fn test_alarm_add_rejects_bad_time() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["alarm", "add", "--time", "7:30"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"), "stderr: {stderr}");
    assert!(list_alarms(home.path()).is_empty());
}

#[test]
fn test_unknown_alarm_fails() {
    let home = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(home.path(), &["alarm", "toggle", "nope"]);
    assert_ne!(code, 0);
}

#[test]
fn test_challenge_is_reproducible_and_verifies() {
    let home = tempfile::tempdir().unwrap();
    let args = ["challenge", "--difficulty", "hard", "--seed", "42"];
    let first = run_cli_success(home.path(), &args);
    assert_eq!(first, run_cli_success(home.path(), &args));

    let (_, stderr, code) = run_cli(home.path(), &[&args[..], &["--answer", "-999999"]].concat());
    assert_ne!(code, 0);
    let expected = stderr
        .trim()
        .rsplit(' ')
        .next()
        .expect("stderr names the expected answer")
        .to_string();

    let out = run_cli_success(home.path(), &[&args[..], &["--answer", &expected]].concat());
    assert!(out.contains("correct"));
}

#[test]
fn test_config_set_persists() {
    let home = tempfile::tempdir().unwrap();
    assert_eq!(run_cli_success(home.path(), &["config", "get", "display.clock24"]).trim(), "false");
    run_cli_success(home.path(), &["config", "set", "display.clock24", "true"]);
    assert_eq!(run_cli_success(home.path(), &["config", "get", "display.clock24"]).trim(), "true");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "display.nope", "1"]);
    assert_ne!(code, 0);

    run_cli_success(home.path(), &["config", "reset"]);
    assert_eq!(run_cli_success(home.path(), &["config", "get", "display.clock24"]).trim(), "false");
}

#[test]
fn test_data_export_reset_import() {
    let home = tempfile::tempdir().unwrap();
    run_cli_success(home.path(), &["alarm", "add", "--time", "05:00"]);
    let backup = home.path().join("backup.json");
    let backup_str = backup.to_str().unwrap();
    run_cli_success(home.path(), &["data", "export", "--out", backup_str]);

    let (_, _, code) = run_cli(home.path(), &["data", "reset"]);
    assert_ne!(code, 0, "reset requires --yes");
    run_cli_success(home.path(), &["data", "reset", "--yes"]);
    assert!(list_alarms(home.path()).is_empty());

    let out = run_cli_success(home.path(), &["data", "import", backup_str]);
    assert!(out.contains("Imported 1 keys"));
    assert_eq!(list_alarms(home.path())[0]["time"], "05:00");
    assert!(run_cli_success(home.path(), &["data", "size"]).contains("KB"));
}

#[test]
fn test_run_reports_requests_and_quits() {
    let home = tempfile::tempdir().unwrap();
    let mut child = Command::new("cargo")
        .args(["run", "-q", "-p", "reveille-cli", "--", "run", "--no-tick-thread"])
        .env("HOME", home.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, "snooze").unwrap();
        writeln!(stdin, "quit").unwrap();
    }
    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(0));

    let events: Vec<serde_json::Value> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    assert_eq!(events[0]["type"], "TickDegraded");
    assert!(events.iter().any(|e| e["type"] == "RequestFailed"));
}

#[test]
fn test_run_saves_alarms_from_stdin() {
    let home = tempfile::tempdir().unwrap();
    run_cli_success(home.path(), &["alarm", "add", "--time", "22:00"]);

    let mut child = Command::new("cargo")
        .args(["run", "-q", "-p", "reveille-cli", "--", "run", "--no-tick-thread"])
        .env("HOME", home.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, r#"save {{"time": "05:30", "label": "Run"}}"#).unwrap();
        writeln!(stdin, "quit").unwrap();
    }
    let output = child.wait_with_output().unwrap();
    assert_eq!(output.status.code(), Some(0));

    let alarms = list_alarms(home.path());
    assert_eq!(alarms.len(), 2);
    assert!(alarms.iter().any(|a| a["time"] == "05:30" && a["label"] == "Run"));
    assert!(alarms.iter().any(|a| a["time"] == "22:00"));
}

#[test]
fn test_completions() {
    let home = tempfile::tempdir().unwrap();
    let out = run_cli_success(home.path(), &["completions", "bash"]);
    assert!(out.contains("reveille-cli"));
}
