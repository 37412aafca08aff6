//! One scan step end to end: provision, update templates, run the scanner.
//!
//! Only configuration and provisioning problems are returned as errors. A
//! process that cannot be launched is logged and reported through
//! `ScanOutcome::status`; the caller decides what that means for the build.
use crate::args::merge_cli_arguments;
use crate::config::StepConfig;
use crate::error::{Result, StepError};
use crate::launcher::{launch_logged, BuildLog, LaunchStatus};
use crate::platform::classify_os;
use crate::router::{ExecutionRouter, ProvisionJob};
use crate::workspace::{BinaryHandle, WorkingDirectory};
use std::path::PathBuf;

/// User-facing inputs of one scan step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    pub target_url: String,
    pub additional_flags: Option<String>,
    pub reporting_config: Option<String>,
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub binary: BinaryHandle,
    pub command: Vec<String>,
    pub output_path: PathBuf,
    /// `None` when the scanner process could not be launched.
    pub status: Option<LaunchStatus>,
}

pub struct ScanOrchestrator<'a> {
    router: &'a ExecutionRouter,
    log: BuildLog,
    release_index_url: String,
    project: String,
    version: Option<String>,
    raw_os: String,
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(router: &'a ExecutionRouter, config: &StepConfig, log: BuildLog) -> Self {
        Self {
            router,
            log,
            release_index_url: config.release_index_url.clone(),
            project: config.project.clone(),
            version: None,
            raw_os: std::env::consts::OS.to_string(),
        }
    }

    /// Provision this release instead of the latest one.
    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version;
        self
    }

    /// Override the OS name reported by the runtime.
    pub fn with_raw_os(mut self, raw: impl Into<String>) -> Self {
        self.raw_os = raw.into();
        self
    }

    pub fn run_scan(
        &self,
        request: &ScanRequest,
        working_dir: &WorkingDirectory,
    ) -> Result<ScanOutcome> {
        let target_url = request.target_url.trim();
        if target_url.is_empty() {
            return Err(StepError::MissingTargetUrl);
        }

        self.log.line(&format!(
            "Workspace absolute path: {}",
            working_dir.root().display()
        ));
        let platform = classify_os(&self.raw_os)?;
        self.log
            .line(&format!("Retrieved operating system: {platform}"));

        let job = ProvisionJob {
            working_dir: working_dir.clone(),
            release_index_url: self.release_index_url.clone(),
            project: self.project.clone(),
            version: self.version.clone(),
        };
        let binary = self.router.provision_and_locate(&job)?;
        let binary_path = binary.display_path();
        let templates_dir = working_dir.templates_dir().display().to_string();

        let update = vec![
            binary_path.clone(),
            "-update-directory".to_string(),
            templates_dir.clone(),
            "-update-templates".to_string(),
            "-no-color".to_string(),
        ];
        if let Some(status) = launch_logged(self.router.launcher(), &self.log, &update) {
            if !status.success() {
                tracing::warn!(code = ?status.code, "template update exited unsuccessfully");
            }
        }

        let report_config_path = match request.reporting_config.as_deref() {
            Some(contents) if !contents.is_empty() => {
                let path = working_dir.reporting_config_path();
                self.router.write_file(&path, contents)?;
                Some(path)
            }
            _ => None,
        };

        let output_path = working_dir.output_path(&request.run_id);
        let mut mandatory = vec![
            binary_path,
            "-templates".to_string(),
            templates_dir,
            "-target".to_string(),
            target_url.to_string(),
            "-output".to_string(),
            output_path.display().to_string(),
            "-no-color".to_string(),
        ];
        if let Some(path) = &report_config_path {
            mandatory.push("-report-config".to_string());
            mandatory.push(path.display().to_string());
        }
        let command = merge_cli_arguments(&mandatory, request.additional_flags.as_deref());

        tracing::info!(node = %self.router.describe(), target = %target_url, "starting scan");
        let status = launch_logged(self.router.launcher(), &self.log, &command);
        Ok(ScanOutcome {
            binary,
            command,
            output_path,
            status,
        })
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
