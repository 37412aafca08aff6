mod common;

use common::{stderr_text, stdout_text, step_command, Workspace};
use std::io::Write;
use std::process::Stdio;

fn run_worker(stdin: &str) -> std::process::Output {
    let mut child = step_command()
        .arg("worker")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn worker");
    child
        .stdin
        .take()
        .expect("worker stdin")
        .write_all(stdin.as_bytes())
        .expect("write unit of work");
    child.wait_with_output().expect("wait for worker")
}

#[test]
fn platform_reports_current_machine() {
    let output = step_command().arg("platform").output().expect("run platform");
    if !output.status.success() {
        // Unsupported build hosts (e.g. riscv) are reported, not crashed on.
        assert!(stderr_text(&output).contains("unsupported"));
        return;
    }
    let stdout = stdout_text(&output);
    assert!(stdout.contains("platform: "), "stdout was {stdout:?}");
    assert!(stdout.contains("architecture: "), "stdout was {stdout:?}");
    #[cfg(target_os = "linux")]
    assert!(stdout.contains("platform: linux"), "stdout was {stdout:?}");
}

#[test]
fn empty_target_url_fails_the_step() {
    let workspace = Workspace::temp();
    let output = step_command()
        .args(["run", "--target-url", "", "--workspace"])
        .arg(workspace.path())
        .output()
        .expect("run step");
    assert!(!output.status.success());
    let stderr = stderr_text(&output);
    assert!(
        stderr.contains("target URL must not be empty"),
        "stderr was {stderr:?}"
    );
}

#[test]
fn unknown_worker_is_rejected() {
    let workspace = Workspace::temp();
    let output = step_command()
        .args(["run", "--target-url", "http://x", "--worker", "agent-9"])
        .arg("--workspace")
        .arg(workspace.path())
        .output()
        .expect("run step");
    assert!(!output.status.success());
    let stderr = stderr_text(&output);
    assert!(
        stderr.contains("no channel configured for worker 'agent-9'"),
        "stderr was {stderr:?}"
    );
}

#[test]
fn invalid_config_is_rejected() {
    let workspace = Workspace::temp();
    let config = workspace.write_config(r#"{"schema_version": 2}"#);
    let output = step_command()
        .args(["provision", "--config"])
        .arg(&config)
        .arg("--workspace")
        .arg(workspace.path())
        .output()
        .expect("run provision");
    assert!(!output.status.success());
    assert!(stderr_text(&output).contains("unsupported schema_version 2"));
}

#[test]
fn worker_answers_malformed_input_with_failure() {
    let output = run_worker("{not json");
    assert!(!output.status.success());
    let reply: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("reply is JSON");
    assert_eq!(reply["status"], "failed");
    assert!(reply["message"]
        .as_str()
        .expect("message")
        .contains("malformed unit of work"));
}

#[test]
fn worker_writes_files() {
    let workspace = Workspace::temp();
    let path = workspace.path().join("reporting_config.yml");
    let request = serde_json::json!({
        "kind": "write_file",
        "path": path,
        "contents": "github:\n  owner: acme\n",
    });
    let output = run_worker(&request.to_string());
    assert!(output.status.success(), "stderr: {}", stderr_text(&output));
    let reply: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("reply is JSON");
    assert_eq!(reply["status"], "written");
    assert_eq!(
        std::fs::read_to_string(&path).expect("written file"),
        "github:\n  owner: acme\n"
    );
}
