//! Shared test infrastructure for integration tests.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Path of the binary under test.
pub fn step_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_nuclei-step"))
}

/// `nuclei-step` with a quiet, network-free environment.
pub fn step_command() -> Command {
    let mut command = Command::new(step_binary());
    command
        .env("RUST_LOG", "off")
        .env("NUCLEI_STEP_RELEASE_URL", "http://127.0.0.1:9/releases")
        .env_remove("BUILD_ID");
    command
}

pub fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Temporary workspace, optionally seeded with a stand-in scanner.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn temp() -> Self {
        Self {
            dir: TempDir::new().expect("create workspace"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Install a shell script as `nuclei` so no download is needed.
    #[cfg(unix)]
    #[allow(dead_code)]
    pub fn seed_scanner(&self, script: &str) -> PathBuf {
        let path = self.path().join("nuclei");
        std::fs::write(&path, script).expect("write fake scanner");
        path
    }

    #[allow(dead_code)]
    pub fn write_config(&self, json: &str) -> PathBuf {
        let path = self.path().join("step-config.json");
        std::fs::write(&path, json).expect("write config");
        path
    }
}
