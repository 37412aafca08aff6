//! Routing of provisioning and process launches to the controller or a worker.
//!
//! Work shipped to a worker is a plain serde value. The worker runs it with its
//! own environment and answers with a single `WorkOutcome`; nothing from the
//! controller is shared during the call.
use crate::config::{StepConfig, WorkerConfig};
use crate::error::{Result, StepError};
use crate::launcher::{BuildLog, LaunchStatus, LocalLauncher, ProcessLauncher};
use crate::platform::current_platform;
use crate::provision::BinaryProvisioner;
use crate::release::{HtmlReleaseIndex, HttpAssetFetcher, HttpIndexSource, ReleaseVersion};
use crate::workspace::{BinaryHandle, WorkingDirectory};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Where a step executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionTarget {
    Controller,
    Worker(String),
}

impl ExecutionTarget {
    pub fn from_worker_name(name: Option<&str>) -> Self {
        match name {
            Some(name) if !name.trim().is_empty() => ExecutionTarget::Worker(name.to_string()),
            _ => ExecutionTarget::Controller,
        }
    }
}

/// Self-contained provisioning request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionJob {
    pub working_dir: WorkingDirectory,
    pub release_index_url: String,
    pub project: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl ProvisionJob {
    /// Classify the local platform and provision against the live release index.
    pub fn run(&self, log: &BuildLog) -> Result<BinaryHandle> {
        let platform = current_platform()?;
        let version = self
            .version
            .as_deref()
            .map(ReleaseVersion::parse)
            .transpose()?;
        let resolver = HtmlReleaseIndex::new(
            HttpIndexSource::new(self.release_index_url.clone()),
            self.project.clone(),
        );
        let fetcher = HttpAssetFetcher;
        let launcher = LocalLauncher::new(log.clone());
        BinaryProvisioner::new(
            self.project.clone(),
            &resolver,
            &fetcher,
            &launcher,
            log.clone(),
        )
        .with_version(version)
        .with_raw_architecture(std::env::consts::ARCH)
        .ensure_binary(&self.working_dir, platform)
    }
}

/// Unit of work accepted by `nuclei-step worker`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitOfWork {
    Provision(ProvisionJob),
    WriteFile { path: PathBuf, contents: String },
}

impl UnitOfWork {
    pub fn run(&self, log: &BuildLog) -> Result<WorkOutcome> {
        match self {
            UnitOfWork::Provision(job) => Ok(WorkOutcome::Provisioned {
                binary: job.run(log)?,
            }),
            UnitOfWork::WriteFile { path, contents } => {
                write_text_file(path, contents)?;
                Ok(WorkOutcome::Written)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkOutcome {
    Provisioned { binary: BinaryHandle },
    Written,
    Failed { message: String },
}

/// Write `contents` verbatim as UTF-8.
pub fn write_text_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents.as_bytes()).map_err(|source| StepError::ReportConfigWrite {
        path: path.to_path_buf(),
        source,
    })
}

/// An execution location able to run provisioning, file writes, and processes.
pub trait ExecutionNode {
    fn describe(&self) -> String;

    fn provision(&self, job: &ProvisionJob) -> Result<BinaryHandle>;

    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    fn launcher(&self) -> &dyn ProcessLauncher;
}

/// The controller process itself.
#[derive(Debug)]
pub struct ControllerNode {
    log: BuildLog,
    launcher: LocalLauncher,
}

impl ControllerNode {
    pub fn new(log: BuildLog) -> Self {
        Self {
            launcher: LocalLauncher::new(log.clone()),
            log,
        }
    }
}

impl ExecutionNode for ControllerNode {
    fn describe(&self) -> String {
        "controller".to_string()
    }

    fn provision(&self, job: &ProvisionJob) -> Result<BinaryHandle> {
        job.run(&self.log)
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        write_text_file(path, contents)
    }

    fn launcher(&self) -> &dyn ProcessLauncher {
        &self.launcher
    }
}

/// A remote worker reached through a configured command prefix.
#[derive(Debug)]
pub struct WorkerNode {
    name: String,
    config: WorkerConfig,
    log: BuildLog,
    launcher: RemoteLauncher,
}

impl WorkerNode {
    pub fn new(name: impl Into<String>, config: WorkerConfig, log: BuildLog) -> Self {
        Self {
            name: name.into(),
            launcher: RemoteLauncher {
                config: config.clone(),
                inner: LocalLauncher::new(log.clone()),
            },
            config,
            log,
        }
    }

    fn dispatch(&self, work: &UnitOfWork) -> Result<WorkOutcome> {
        let failed = |message: String| StepError::RemoteDispatch {
            target: self.name.clone(),
            message,
        };
        let payload = serde_json::to_vec(work)
            .map_err(|err| failed(format!("serialize unit of work: {err}")))?;
        let worker_argv = vec![self.config.step_binary.clone(), "worker".to_string()];
        let argv = remote_argv(&self.config, &worker_argv);
        tracing::info!(worker = %self.name, command = %shell_words::join(&argv), "dispatching to worker");

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| failed("empty worker command".to_string()))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| failed(format!("spawn {program}: {err}")))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (written, response) = std::thread::scope(|scope| {
            if let Some(stderr) = stderr {
                scope.spawn(|| copy_worker_log(&self.log, stderr));
            }
            let reader = scope.spawn(move || -> io::Result<Vec<u8>> {
                let mut buf = Vec::new();
                if let Some(mut stdout) = stdout {
                    stdout.read_to_end(&mut buf)?;
                }
                Ok(buf)
            });
            let written = match stdin {
                Some(mut stdin) => stdin.write_all(&payload),
                None => Ok(()),
            };
            let response = reader
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("worker reader panicked")));
            (written, response)
        });
        let status = child
            .wait()
            .map_err(|err| failed(format!("wait for worker: {err}")))?;
        let response = response.map_err(|err| failed(format!("read worker reply: {err}")))?;

        match serde_json::from_slice::<WorkOutcome>(&response) {
            Ok(WorkOutcome::Failed { message }) => Err(failed(message)),
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                written.map_err(|err| failed(format!("send unit of work: {err}")))?;
                Err(failed(format!(
                    "unreadable reply (exit {:?}): {err}",
                    status.code()
                )))
            }
        }
    }
}

impl ExecutionNode for WorkerNode {
    fn describe(&self) -> String {
        format!("worker '{}'", self.name)
    }

    fn provision(&self, job: &ProvisionJob) -> Result<BinaryHandle> {
        match self.dispatch(&UnitOfWork::Provision(job.clone()))? {
            WorkOutcome::Provisioned { binary } => Ok(binary),
            other => Err(StepError::RemoteDispatch {
                target: self.name.clone(),
                message: format!("unexpected reply to provisioning: {other:?}"),
            }),
        }
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        let work = UnitOfWork::WriteFile {
            path: path.to_path_buf(),
            contents: contents.to_string(),
        };
        match self.dispatch(&work)? {
            WorkOutcome::Written => Ok(()),
            other => Err(StepError::RemoteDispatch {
                target: self.name.clone(),
                message: format!("unexpected reply to file write: {other:?}"),
            }),
        }
    }

    fn launcher(&self) -> &dyn ProcessLauncher {
        &self.launcher
    }
}

/// Launches processes on a worker through its command prefix.
#[derive(Debug)]
pub struct RemoteLauncher {
    config: WorkerConfig,
    inner: LocalLauncher,
}

impl ProcessLauncher for RemoteLauncher {
    fn launch(&self, argv: &[String]) -> io::Result<LaunchStatus> {
        self.inner.launch(&remote_argv(&self.config, argv))
    }
}

fn remote_argv(config: &WorkerConfig, argv: &[String]) -> Vec<String> {
    let mut full = config.command.clone();
    if config.remote_shell {
        full.push(shell_words::join(argv));
    } else {
        full.extend(argv.iter().cloned());
    }
    full
}

fn copy_worker_log(log: &BuildLog, stderr: impl Read) {
    use std::io::BufRead;
    for line in io::BufReader::new(stderr).lines().map_while(io::Result::ok) {
        log.line(&line);
    }
}

/// Picks the execution node for a step and forwards work to it.
pub struct ExecutionRouter {
    node: Box<dyn ExecutionNode>,
}

impl ExecutionRouter {
    pub fn new(node: Box<dyn ExecutionNode>) -> Self {
        Self { node }
    }

    /// Route to the controller or to a configured worker.
    pub fn for_target(target: &ExecutionTarget, config: &StepConfig, log: BuildLog) -> Result<Self> {
        let node: Box<dyn ExecutionNode> = match target {
            ExecutionTarget::Controller => Box::new(ControllerNode::new(log)),
            ExecutionTarget::Worker(name) => {
                let worker = config
                    .workers
                    .get(name)
                    .ok_or_else(|| StepError::UnsupportedTarget(name.clone()))?;
                Box::new(WorkerNode::new(name.clone(), worker.clone(), log))
            }
        };
        Ok(Self::new(node))
    }

    pub fn describe(&self) -> String {
        self.node.describe()
    }

    pub fn provision_and_locate(&self, job: &ProvisionJob) -> Result<BinaryHandle> {
        tracing::info!(node = %self.node.describe(), dir = %job.working_dir.root().display(), "provisioning scanner");
        self.node.provision(job)
    }

    pub fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.node.write_file(path, contents)
    }

    pub fn launcher(&self) -> &dyn ProcessLauncher {
        self.node.launcher()
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
