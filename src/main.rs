//! nuclei-step: provision the nuclei scanner and run it as a pipeline step.
mod archive;
mod args;
mod cli;
mod config;
mod error;
mod launcher;
mod logging;
mod orchestrator;
mod platform;
mod provision;
mod release;
mod router;
mod workflow;
mod workspace;

use anyhow::Result;
use clap::Parser;
use cli::{Command, RootArgs};
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    logging::init_tracing();
    let args = RootArgs::parse();

    match args.command {
        Command::Run(args) => workflow::run_scan(args),
        Command::Provision(args) => workflow::run_provision(args).map(|()| ExitCode::SUCCESS),
        Command::Versions(args) => workflow::run_versions(args).map(|()| ExitCode::SUCCESS),
        Command::Platform => workflow::run_platform().map(|()| ExitCode::SUCCESS),
        Command::Worker => workflow::run_worker(),
    }
}
