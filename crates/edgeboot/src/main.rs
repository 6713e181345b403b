//! `edgeboot`: run the tunnel bootstrap pipeline, then the host command.
//!
//! The pipeline never decides the outcome. Once it has run (or failed, or
//! been refused a usable configuration), the host command is started and its
//! exit code becomes ours. SIGINT/SIGTERM stop the host and every supervised
//! tool exactly once, including while the pipeline is still booting.

mod cli;
mod error;
mod host;
mod preflight;
mod shutdown;

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use edgeboot_core::{BootReport, Orchestrator};

use crate::cli::{Cli, LogFormat};
use crate::error::{CliError, exit_code};
use crate::shutdown::ShutdownSignal;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            std::process::exit(code);
        }
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(cli: Cli) -> Result<i32, CliError> {
    preflight::check()?;

    let mut signal = ShutdownSignal::install()?;

    let orchestrator = match orchestrator(cli.config.as_deref()) {
        Ok(orchestrator) => Some(orchestrator),
        Err(err) => {
            warn!(error = %err, "configuration rejected; starting host without bootstrap");
            None
        }
    };
    let hook = orchestrator.as_ref().map(Orchestrator::shutdown_hook);

    if let Some(orchestrator) = &orchestrator {
        tokio::select! {
            report = orchestrator.boot() => log_report(&report),
            name = signal.recv() => {
                warn!(signal = name, "shutdown requested during bootstrap");
                if let Some(hook) = &hook {
                    hook.fire().await;
                }
                return Ok(exit_code::SUCCESS);
            }
        }
    }

    let code = match cli.command.split_first() {
        Some((program, args)) => host::run(program, args, &mut signal).await,
        None => {
            info!("no host command; waiting for a shutdown signal");
            let name = signal.recv().await;
            info!(signal = name, "shutdown requested");
            Ok(exit_code::SUCCESS)
        }
    };

    if let Some(hook) = &hook {
        hook.fire().await;
    }
    code
}

fn orchestrator(explicit: Option<&Path>) -> Result<Orchestrator, CliError> {
    let config = edgeboot_config::load(config_path(explicit).as_deref())?;
    Ok(Orchestrator::new(config)?)
}

/// `--config` / `EDGEBOOT_CONFIG`, else the platform default when it exists.
fn config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found; using environment only");
        }
        return Some(path.to_path_buf());
    }
    edgeboot_config::default_config_path().filter(|path| path.is_file())
}

fn log_report(report: &BootReport) {
    if let Some(error) = &report.error {
        warn!(error = %error, "bootstrap incomplete");
    }
    info!(
        mode = report.tunnel_mode.unwrap_or("none"),
        started = ?report.started,
        domain = report.domain.as_deref().unwrap_or("-"),
        links = report.subscription.as_ref().map_or(0, |doc| doc.links().len()),
        "bootstrap finished"
    );
}
