//! Process launching with output streamed into the build log.
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};

/// Line-oriented sink shared by the step and every child process it runs.
#[derive(Clone)]
pub struct BuildLog {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl BuildLog {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }

    /// Append to `path`, creating it when missing.
    pub fn file(path: &Path) -> io::Result<Self> {
        let file = File::options().create(true).append(true).open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    pub fn line(&self, text: &str) {
        // A poisoned sink only means another writer panicked mid-line.
        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(sink, "{text}");
        let _ = sink.flush();
    }

    fn copy_lines(&self, reader: impl Read) {
        for line in BufReader::new(reader).lines() {
            match line {
                Ok(line) => self.line(&line),
                Err(err) => {
                    tracing::warn!(error = %err, "stopped reading child output");
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for BuildLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildLog").finish_non_exhaustive()
    }
}

/// Exit status of a launched process; `code` is `None` when killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchStatus {
    pub code: Option<i32>,
}

impl LaunchStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

pub trait ProcessLauncher {
    /// Run `argv` to completion with stdout/stderr attached to the build log.
    fn launch(&self, argv: &[String]) -> io::Result<LaunchStatus>;
}

/// Runs commands on this machine.
#[derive(Debug, Clone)]
pub struct LocalLauncher {
    log: BuildLog,
}

impl LocalLauncher {
    pub fn new(log: BuildLog) -> Self {
        Self { log }
    }
}

impl ProcessLauncher for LocalLauncher {
    fn launch(&self, argv: &[String]) -> io::Result<LaunchStatus> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        tracing::debug!(command = %shell_words::join(argv), "launching process");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        std::thread::scope(|scope| {
            if let Some(stdout) = stdout {
                scope.spawn(|| self.log.copy_lines(stdout));
            }
            if let Some(stderr) = stderr {
                scope.spawn(|| self.log.copy_lines(stderr));
            }
        });
        let status = child.wait()?;
        Ok(LaunchStatus {
            code: status.code(),
        })
    }
}

/// Run `argv`, logging instead of failing when the process cannot be run.
pub fn launch_logged(
    launcher: &dyn ProcessLauncher,
    log: &BuildLog,
    argv: &[String],
) -> Option<LaunchStatus> {
    match launcher.launch(argv) {
        Ok(status) => Some(status),
        Err(err) => {
            log.line(&format!(
                "Error while trying to run the following command: {}",
                shell_words::join(argv)
            ));
            tracing::warn!(error = %err, program = ?argv.first(), "process launch failed");
            None
        }
    }
}
