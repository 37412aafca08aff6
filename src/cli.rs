//! CLI argument parsing for the scan step.
//!
//! Arguments map one to one onto step inputs; defaults that depend on the
//! environment (run id, workspace) are resolved by the command handlers.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "nuclei-step",
    version,
    about = "Provision the nuclei scanner and run it as a pipeline step",
    after_help = "Examples:\n  nuclei-step run --target-url https://scanme.example\n  nuclei-step run --target-url https://scanme.example --additional-flags \"-severity critical -rl 10\"\n  nuclei-step run --target-url https://scanme.example --worker agent-1 --workspace /srv/ws\n  nuclei-step provision --workspace /tmp/ws\n  nuclei-step versions --assets",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Provision(ProvisionArgs),
    Versions(VersionsArgs),
    /// Print the platform and architecture this machine maps to
    Platform,
    /// Execute one unit of work read from stdin (remote worker side)
    #[command(hide = true)]
    Worker,
}

/// Where the step runs and what it provisions.
#[derive(clap::Args, Debug, Clone)]
pub struct TargetArgs {
    /// Working directory for the binary, templates, and scan output
    #[arg(long, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Configured worker to run on instead of this machine
    #[arg(long, value_name = "NAME")]
    pub worker: Option<String>,

    /// Release to download instead of the latest one
    #[arg(long = "version", value_name = "X.Y.Z")]
    pub pinned_version: Option<String>,

    /// Step config file (default: <workspace>/.nuclei-step.json)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Provision the scanner, update templates, and scan a target")]
pub struct RunArgs {
    /// URL to scan
    #[arg(long, value_name = "URL")]
    pub target_url: String,

    /// Extra scanner flags, e.g. "-severity critical -rl 10"
    #[arg(long, value_name = "FLAGS", allow_hyphen_values = true)]
    pub additional_flags: Option<String>,

    /// File whose contents become reporting_config.yml
    #[arg(long, value_name = "FILE")]
    pub reporting_config: Option<PathBuf>,

    /// Identifier used in the output file name (default: $BUILD_ID, then epoch ms)
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Append the build log to this file instead of stdout
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Make sure the scanner binary is present and print its path")]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Parser, Debug)]
#[command(about = "List releases published on the release index")]
pub struct VersionsArgs {
    /// Also print the download URL for this platform and architecture
    #[arg(long)]
    pub assets: bool,

    /// Step config file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}
