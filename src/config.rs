//! Step configuration.
//!
//! The config file is optional; every field has a default so a bare working
//! directory provisions from the upstream release page.
use crate::error::{Result, StepError};
use crate::release::{DEFAULT_PROJECT, DEFAULT_RELEASE_INDEX_URL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

/// Current schema version for the step config file.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;
/// Environment override for `release_index_url`.
pub const RELEASE_URL_ENV: &str = "NUCLEI_STEP_RELEASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_release_index_url")]
    pub release_index_url: String,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerConfig>,
}

/// How to reach one remote worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Argv prefix that runs a command on the worker, e.g. `["ssh", "agent-1"]`.
    pub command: Vec<String>,
    /// Name or path of this tool on the worker.
    #[serde(default = "default_step_binary")]
    pub step_binary: String,
    /// Join the remote argv into one shell-quoted word (ssh-style prefixes).
    #[serde(default = "default_remote_shell")]
    pub remote_shell: bool,
}

fn default_schema_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

fn default_release_index_url() -> String {
    DEFAULT_RELEASE_INDEX_URL.to_string()
}

fn default_project() -> String {
    DEFAULT_PROJECT.to_string()
}

fn default_step_binary() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_remote_shell() -> bool {
    true
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            release_index_url: default_release_index_url(),
            project: default_project(),
            workers: BTreeMap::new(),
        }
    }
}

/// Load the config at `path`, or defaults when the file does not exist.
pub fn load_config(path: &Path) -> Result<StepConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no step config, using defaults");
        return Ok(StepConfig::default());
    }
    let bytes = fs::read(path)
        .map_err(|err| StepError::Config(format!("read {}: {err}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| StepError::Config(format!("parse {}: {err}", path.display())))
}

/// Apply environment overrides on top of a loaded config.
pub fn apply_env_overrides(mut config: StepConfig) -> StepConfig {
    if let Ok(url) = env::var(RELEASE_URL_ENV) {
        if !url.trim().is_empty() {
            config.release_index_url = url.trim().to_string();
        }
    }
    config
}

pub fn validate_config(config: &StepConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(StepError::Config(format!(
            "unsupported schema_version {}",
            config.schema_version
        )));
    }
    if config.release_index_url.trim().is_empty() {
        return Err(StepError::Config("release_index_url is empty".to_string()));
    }
    if config.project.trim().is_empty() {
        return Err(StepError::Config("project is empty".to_string()));
    }
    for (name, worker) in &config.workers {
        if worker.command.is_empty() || worker.command[0].trim().is_empty() {
            return Err(StepError::Config(format!(
                "worker '{name}' has an empty command"
            )));
        }
        if worker.step_binary.trim().is_empty() {
            return Err(StepError::Config(format!(
                "worker '{name}' has an empty step_binary"
            )));
        }
    }
    Ok(())
}
