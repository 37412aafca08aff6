use crate::cli::{ProvisionArgs, RunArgs, VersionsArgs};
use crate::config::{apply_env_overrides, load_config, validate_config, StepConfig};
use crate::launcher::{BuildLog, LaunchStatus};
use crate::orchestrator::{ScanOrchestrator, ScanRequest};
use crate::platform::{current_architecture, current_platform};
use crate::release::{HtmlReleaseIndex, HttpIndexSource, ReleaseResolver};
use crate::router::{ExecutionRouter, ExecutionTarget, ProvisionJob, UnitOfWork, WorkOutcome};
use crate::workspace::{WorkingDirectory, CONFIG_FILE_NAME};
use anyhow::{anyhow, Context, Result};
use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

/// Environment variable a CI system uses for the current build number.
const BUILD_ID_ENV: &str = "BUILD_ID";

pub fn run_scan(args: RunArgs) -> Result<ExitCode> {
    let target = ExecutionTarget::from_worker_name(args.target.worker.as_deref());
    let working_dir = resolve_working_dir(args.target.workspace.as_deref(), &target)?;
    let config = load_step_config(args.target.config.as_deref(), Some(&working_dir))?;
    let log = match &args.log_file {
        Some(path) => {
            BuildLog::file(path).with_context(|| format!("open log file {}", path.display()))?
        }
        None => BuildLog::stdout(),
    };
    let reporting_config = args
        .reporting_config
        .as_deref()
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("read reporting config {}", path.display()))
        })
        .transpose()?;
    let request = ScanRequest {
        target_url: args.target_url,
        additional_flags: args.additional_flags,
        reporting_config,
        run_id: resolve_run_id(args.run_id)?,
    };

    let router = ExecutionRouter::for_target(&target, &config, log.clone())?;
    let outcome = ScanOrchestrator::new(&router, &config, log)
        .with_version(args.target.pinned_version)
        .with_raw_os(std::env::consts::OS)
        .run_scan(&request, &working_dir)
        .context("scan step failed")?;

    tracing::info!(
        output = %outcome.output_path.display(),
        code = ?outcome.status.and_then(|status| status.code),
        "scan finished"
    );
    Ok(ExitCode::from(scan_exit_code(outcome.status)))
}

pub fn run_provision(args: ProvisionArgs) -> Result<()> {
    let target = ExecutionTarget::from_worker_name(args.target.worker.as_deref());
    let working_dir = resolve_working_dir(args.target.workspace.as_deref(), &target)?;
    let config = load_step_config(args.target.config.as_deref(), Some(&working_dir))?;
    // stdout carries only the resulting path.
    let log = BuildLog::stderr();
    let router = ExecutionRouter::for_target(&target, &config, log)?;
    let job = ProvisionJob {
        working_dir,
        release_index_url: config.release_index_url.clone(),
        project: config.project.clone(),
        version: args.target.pinned_version,
    };
    let binary = router
        .provision_and_locate(&job)
        .with_context(|| format!("provision on {}", router.describe()))?;
    println!("{}", binary.display_path());
    Ok(())
}

pub fn run_versions(args: VersionsArgs) -> Result<()> {
    let config = load_step_config(args.config.as_deref(), None)?;
    let index = HtmlReleaseIndex::new(
        HttpIndexSource::new(config.release_index_url.clone()),
        config.project.clone(),
    );
    if !args.assets {
        for version in index.list_versions().context("list releases")? {
            println!("{version}");
        }
        return Ok(());
    }

    let platform = current_platform()?;
    let architecture = current_architecture()?;
    for (version, asset) in index
        .release_urls(platform, architecture)
        .context("list release assets")?
    {
        match asset {
            Ok(asset) => println!("{version}\t{}", asset.url),
            Err(err) => println!("{version}\tmissing ({err})"),
        }
    }
    Ok(())
}

pub fn run_platform() -> Result<()> {
    let platform = current_platform().context("classify operating system")?;
    let architecture = current_architecture().context("classify architecture")?;
    println!("platform: {platform}");
    println!("architecture: {architecture}");
    Ok(())
}

/// Worker side of a dispatch: one unit of work on stdin, one outcome on stdout.
pub fn run_worker() -> Result<ExitCode> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("read unit of work from stdin")?;
    let log = BuildLog::stderr();
    let outcome = match serde_json::from_str::<UnitOfWork>(&input) {
        Ok(work) => work.run(&log).unwrap_or_else(|err| WorkOutcome::Failed {
            message: err.to_string(),
        }),
        Err(err) => WorkOutcome::Failed {
            message: format!("malformed unit of work: {err}"),
        },
    };
    let failed = matches!(outcome, WorkOutcome::Failed { .. });
    let text = serde_json::to_string(&outcome).context("serialize work outcome")?;
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .context("write work outcome")?;
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Workspace paths of a worker are taken as given; local ones are made absolute.
fn resolve_working_dir(arg: Option<&Path>, target: &ExecutionTarget) -> Result<WorkingDirectory> {
    let root = match (arg, target) {
        (Some(path), ExecutionTarget::Worker(_)) => path.to_path_buf(),
        (Some(path), ExecutionTarget::Controller) if path.is_absolute() => path.to_path_buf(),
        (arg, ExecutionTarget::Controller) => {
            let cwd = env::current_dir().context("resolve current directory")?;
            match arg {
                Some(path) => cwd.join(path),
                None => cwd,
            }
        }
        (None, ExecutionTarget::Worker(name)) => {
            return Err(anyhow!(
                "--workspace is required when running on worker '{name}'"
            ));
        }
    };
    Ok(WorkingDirectory::new(root))
}

fn load_step_config(
    explicit: Option<&Path>,
    working_dir: Option<&WorkingDirectory>,
) -> Result<StepConfig> {
    let path = match (explicit, working_dir) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(dir)) => dir.config_path(),
        (None, None) => PathBuf::from(CONFIG_FILE_NAME),
    };
    if explicit.is_some() && !path.is_file() {
        return Err(anyhow!("config file {} not found", path.display()));
    }
    let config = apply_env_overrides(load_config(&path)?);
    validate_config(&config).with_context(|| format!("validate {}", path.display()))?;
    Ok(config)
}

fn resolve_run_id(explicit: Option<String>) -> Result<String> {
    if let Some(id) = explicit.filter(|id| !id.trim().is_empty()) {
        return Ok(id);
    }
    if let Ok(id) = env::var(BUILD_ID_ENV) {
        if !id.trim().is_empty() {
            return Ok(id);
        }
    }
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_millis();
    Ok(millis.to_string())
}

/// The scanner's own exit code, or 1 when it never ran or was killed.
fn scan_exit_code(status: Option<LaunchStatus>) -> u8 {
    match status.and_then(|status| status.code) {
        Some(code) => u8::try_from(code).unwrap_or(1),
        None => 1,
    }
}
