//! Typed paths into a step working directory.
//!
//! The directory may live on the controller or on a worker; the handle only
//! carries the path and is resolved wherever it is used. Child paths follow
//! the separator style of the root, so a worker's `C:\agent\ws` keeps
//! backslashes even when the command line is assembled on a unix controller.
use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

/// Directory under which templates are updated.
pub const TEMPLATES_DIR_NAME: &str = "nuclei-templates";
/// File the user-supplied reporting configuration is written to.
pub const REPORTING_CONFIG_FILE_NAME: &str = "reporting_config.yml";
/// Default config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".nuclei-step.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDirectory {
    root: PathBuf,
}

impl WorkingDirectory {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<project>[.exe]` inside the working directory.
    pub fn binary_path(&self, project: &str, platform: Platform) -> PathBuf {
        self.child(&format!("{project}{}", platform.executable_suffix()))
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.child(TEMPLATES_DIR_NAME)
    }

    /// `nucleiOutput-<run-id>.txt` for one run.
    pub fn output_path(&self, run_id: &str) -> PathBuf {
        self.child(&format!("nucleiOutput-{run_id}.txt"))
    }

    pub fn reporting_config_path(&self) -> PathBuf {
        self.child(REPORTING_CONFIG_FILE_NAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.child(CONFIG_FILE_NAME)
    }

    fn child(&self, name: &str) -> PathBuf {
        let root = self.root.to_string_lossy();
        let separator = separator_for(&root);
        if separator == MAIN_SEPARATOR {
            return self.root.join(name);
        }
        if root.ends_with(['/', '\\']) {
            PathBuf::from(format!("{root}{name}"))
        } else {
            PathBuf::from(format!("{root}{separator}{name}"))
        }
    }
}

/// Separator style of a root that may belong to another host. Drive letters,
/// UNC prefixes and backslash-only paths are Windows; any other path with a
/// `/` is unix. Bare names fall back to the local separator.
fn separator_for(root: &str) -> char {
    let drive = matches!(root.as_bytes(), [letter, b':', ..] if letter.is_ascii_alphabetic());
    if drive || root.starts_with(r"\\") || (root.contains('\\') && !root.contains('/')) {
        '\\'
    } else if root.contains('/') {
        '/'
    } else {
        MAIN_SEPARATOR
    }
}

/// Provisioned scanner executable.
///
/// Only produced after the file exists and its owner execute bit was set, or a
/// best-effort `chmod` was attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryHandle {
    pub path: PathBuf,
}

impl BinaryHandle {
    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_layout_from_root() {
        let dir = WorkingDirectory::new(PathBuf::from("/ws"));
        assert_eq!(dir.binary_path("nuclei", Platform::Linux), Path::new("/ws/nuclei"));
        assert_eq!(
            dir.binary_path("nuclei", Platform::Windows),
            Path::new("/ws/nuclei.exe")
        );
        assert_eq!(dir.templates_dir(), Path::new("/ws/nuclei-templates"));
        assert_eq!(dir.output_path("42"), Path::new("/ws/nucleiOutput-42.txt"));
        assert_eq!(
            dir.reporting_config_path(),
            Path::new("/ws/reporting_config.yml")
        );
    }

    #[test]
    fn windows_worker_root_keeps_backslashes() {
        let dir = WorkingDirectory::new(PathBuf::from(r"C:\agent\ws"));
        let text = |path: PathBuf| path.display().to_string();
        assert_eq!(
            text(dir.binary_path("nuclei", Platform::Windows)),
            r"C:\agent\ws\nuclei.exe"
        );
        assert_eq!(text(dir.templates_dir()), r"C:\agent\ws\nuclei-templates");
        assert_eq!(text(dir.output_path("7")), r"C:\agent\ws\nucleiOutput-7.txt");
        assert_eq!(
            text(dir.reporting_config_path()),
            r"C:\agent\ws\reporting_config.yml"
        );

        let unc = WorkingDirectory::new(PathBuf::from(r"\\build\share\"));
        assert_eq!(text(unc.templates_dir()), r"\\build\share\nuclei-templates");
    }

    #[test]
    fn unix_worker_root_keeps_forward_slashes() {
        let dir = WorkingDirectory::new(PathBuf::from("/srv/agent/ws"));
        assert_eq!(
            dir.templates_dir().display().to_string(),
            "/srv/agent/ws/nuclei-templates"
        );
        assert_eq!(separator_for("/srv/agent/ws"), '/');
        assert_eq!(separator_for("D:/agent/ws"), '\\');
        assert_eq!(separator_for("ws"), MAIN_SEPARATOR);
    }
}
