use super::{
    copy_worker_log, remote_argv, ExecutionRouter, ExecutionTarget, ProvisionJob, UnitOfWork, WorkOutcome,
    WorkerNode,
};
use crate::config::{StepConfig, WorkerConfig};
use crate::error::StepError;
use crate::launcher::tests::memory_log;
use crate::workspace::{BinaryHandle, WorkingDirectory};
use std::path::PathBuf;

fn job() -> ProvisionJob {
    ProvisionJob {
        working_dir: WorkingDirectory::new(PathBuf::from("/srv/ws")),
        release_index_url: "https://example.com/releases".to_string(),
        project: "nuclei".to_string(),
        version: None,
    }
}

fn worker(command: &[&str], remote_shell: bool) -> WorkerConfig {
    WorkerConfig {
        command: command.iter().map(|part| part.to_string()).collect(),
        step_binary: "nuclei-step".to_string(),
        remote_shell,
    }
}

/// Worker stand-in: drains the request and prints a fixed reply.
#[cfg(unix)]
fn scripted_worker(reply: &str) -> WorkerConfig {
    let script = format!("cat >/dev/null; echo 'worker says hi' 1>&2; printf '%s' '{reply}'");
    worker(&["sh", "-c", &script, "sh"], false)
}

#[test]
fn target_defaults_to_controller() {
    assert_eq!(
        ExecutionTarget::from_worker_name(None),
        ExecutionTarget::Controller
    );
    assert_eq!(
        ExecutionTarget::from_worker_name(Some("  ")),
        ExecutionTarget::Controller
    );
    assert_eq!(
        ExecutionTarget::from_worker_name(Some("agent-1")),
        ExecutionTarget::Worker("agent-1".to_string())
    );
}

#[test]
fn unknown_worker_is_unsupported_target() {
    let (log, _) = memory_log();
    let target = ExecutionTarget::Worker("agent-9".to_string());
    let err = ExecutionRouter::for_target(&target, &StepConfig::default(), log)
        .err()
        .expect("agent-9 is not configured");
    assert!(
        matches!(err, StepError::UnsupportedTarget(ref name) if name == "agent-9"),
        "got {err:?}"
    );
}

#[test]
fn remote_argv_quotes_for_remote_shell() {
    let argv = vec![
        "/srv/ws/nuclei".to_string(),
        "-target".to_string(),
        "http://x/?a=1&b=2".to_string(),
        "-ee".to_string(),
        String::new(),
    ];
    let quoted = remote_argv(&worker(&["ssh", "agent-1"], true), &argv);
    assert_eq!(quoted.len(), 3);
    assert_eq!(&quoted[..2], ["ssh", "agent-1"]);
    assert_eq!(
        shell_words::split(&quoted[2]).expect("split quoted argv"),
        argv
    );

    let plain = remote_argv(&worker(&["docker", "exec", "agent"], false), &argv);
    assert_eq!(plain.len(), 8);
    assert_eq!(plain[3..], argv[..]);
}

#[test]
fn units_of_work_are_tagged_json() {
    let value = serde_json::to_value(UnitOfWork::Provision(job())).expect("serialize");
    assert_eq!(value["kind"], "provision");
    assert_eq!(value["project"], "nuclei");
    assert_eq!(value["working_dir"]["root"], "/srv/ws");

    let outcome: WorkOutcome =
        serde_json::from_str(r#"{"status":"provisioned","binary":{"path":"/srv/ws/nuclei"}}"#)
            .expect("parse outcome");
    assert_eq!(
        outcome,
        WorkOutcome::Provisioned {
            binary: BinaryHandle {
                path: PathBuf::from("/srv/ws/nuclei")
            }
        }
    );
}

#[test]
fn write_file_unit_runs_locally() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("reporting_config.yml");
    let (log, _) = memory_log();
    let work = UnitOfWork::WriteFile {
        path: path.clone(),
        contents: "github:\n  token: x\n".to_string(),
    };
    assert_eq!(work.run(&log).expect("write"), WorkOutcome::Written);
    assert_eq!(
        std::fs::read_to_string(&path).expect("read back"),
        "github:\n  token: x\n"
    );
}

#[test]
fn write_failure_is_report_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (log, _) = memory_log();
    let work = UnitOfWork::WriteFile {
        path: temp.path().join("missing-dir/reporting_config.yml"),
        contents: String::new(),
    };
    assert!(matches!(
        work.run(&log),
        Err(StepError::ReportConfigWrite { .. })
    ));
}

#[test]
fn worker_log_is_copied_line_by_line_until_unreadable() {
    let (log, sink) = memory_log();
    let stderr: &[u8] = b"fetching index\r\nextracting nuclei\nbad \xff byte\nnever seen\n";
    copy_worker_log(&log, stderr);
    let text = sink.text();
    assert!(text.contains("fetching index"), "log was {text:?}");
    assert!(text.contains("extracting nuclei"), "log was {text:?}");
    assert!(!text.contains("never seen"), "log was {text:?}");
}

#[cfg(unix)]
#[test]
fn worker_reply_is_returned_and_stderr_logged() {
    let (log, sink) = memory_log();
    let node = WorkerNode::new(
        "agent-1",
        scripted_worker(r#"{"status":"provisioned","binary":{"path":"/srv/ws/nuclei"}}"#),
        log,
    );
    let router = ExecutionRouter::new(Box::new(node));
    let handle = router.provision_and_locate(&job()).expect("remote provision");
    assert_eq!(handle.path, PathBuf::from("/srv/ws/nuclei"));
    assert!(sink.text().contains("worker says hi"));
    assert_eq!(router.describe(), "worker 'agent-1'");
}

#[cfg(unix)]
#[test]
fn worker_failure_becomes_remote_dispatch_error() {
    let (log, _) = memory_log();
    let node = WorkerNode::new(
        "agent-1",
        scripted_worker(r#"{"status":"failed","message":"no route to release index"}"#),
        log,
    );
    let err = ExecutionRouter::new(Box::new(node))
        .provision_and_locate(&job())
        .expect_err("worker failed");
    match err {
        StepError::RemoteDispatch { target, message } => {
            assert_eq!(target, "agent-1");
            assert_eq!(message, "no route to release index");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[cfg(unix)]
#[test]
fn garbage_reply_is_remote_dispatch_error() {
    let (log, _) = memory_log();
    let node = WorkerNode::new("agent-1", scripted_worker("not json"), log);
    let err = ExecutionRouter::new(Box::new(node))
        .write_file(&PathBuf::from("/srv/ws/reporting_config.yml"), "x")
        .expect_err("garbage reply");
    assert!(matches!(err, StepError::RemoteDispatch { .. }), "got {err:?}");
}

#[test]
fn unreachable_worker_is_remote_dispatch_error() {
    let (log, _) = memory_log();
    let node = WorkerNode::new(
        "agent-1",
        worker(&["/nonexistent/remote-shell"], true),
        log,
    );
    let err = ExecutionRouter::new(Box::new(node))
        .provision_and_locate(&job())
        .expect_err("spawn fails");
    assert!(matches!(err, StepError::RemoteDispatch { .. }), "got {err:?}");
}
