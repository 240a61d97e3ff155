//! Dynamocker daemon - keeps mock definitions in sync with their directory
//!
//! # Usage
//!
//! ```bash
//! # Run in the foreground (default command)
//! dynamockd run --dir ./mocks
//!
//! # Validate every definition file once and exit
//! dynamockd check --dir ./mocks
//! ```
//!
//! Defaults come from `DYNA_*` environment variables; flags override them.

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dynamockd::config::{parse_interval, DaemonConfig};
use dynamockd::scan::scan_directory;
use dynamockd::sync::{ShutdownOutcome, Synchronizer};

/// Dynamocker mock definition daemon
#[derive(Parser, Debug)]
#[command(name = "dynamockd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the synchronizer until SIGINT/SIGTERM
    Run {
        /// Mock definition directory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Reconciliation sweep interval in seconds
        #[arg(long, value_parser = parse_interval_arg)]
        interval: Option<std::time::Duration>,
    },
    /// Load every definition once and report problems
    Check {
        /// Mock definition directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn parse_interval_arg(value: &str) -> Result<std::time::Duration, String> {
    parse_interval("--interval", value).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = DaemonConfig::from_env().context("Invalid environment configuration")?;

    let command = args.command.unwrap_or(Command::Run {
        dir: None,
        interval: None,
    });

    match command {
        Command::Run { dir, interval } => {
            if let Some(dir) = dir {
                config.mock_dir = dir;
            }
            if let Some(interval) = interval {
                config.poll_interval = interval;
            }
            run_daemon(config)
        }
        Command::Check { dir } => {
            if let Some(dir) = dir {
                config.mock_dir = dir;
            }
            if !check(&config)? {
                process::exit(1);
            }
            Ok(())
        }
    }
}

/// Prints what a scan of the directory finds. Returns false if any file was skipped.
fn check(config: &DaemonConfig) -> Result<bool> {
    let sync_config = config.sync_config();
    let mut report = scan_directory(&sync_config.directory, &sync_config.extension)
        .with_context(|| format!("Cannot check {}", sync_config.directory.display()))?;
    report.definitions.sort_by(|a, b| a.id().cmp(b.id()));

    for definition in &report.definitions {
        let verbs: Vec<String> = definition
            .responses()
            .defined_verbs()
            .iter()
            .map(ToString::to_string)
            .collect();
        println!("ok    {}  {}  [{}]", definition.id(), definition.url(), verbs.join(", "));
    }
    for skipped in &report.skipped {
        println!("skip  {}  {}", skipped.path.display(), skipped.error);
    }

    println!(
        "{} loaded, {} skipped",
        report.definitions.len(),
        report.skipped.len()
    );
    Ok(report.skipped.is_empty())
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    let level = &config.log_level;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("dynamockd={level}").parse()?)
                .add_directive(format!("dyna_core={level}").parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        dir = %config.mock_dir.display(),
        interval_secs = config.poll_interval.as_secs(),
        "Dynamocker daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let mut synchronizer = Synchronizer::new(config.sync_config(), cancel_token.clone());
    synchronizer
        .start()
        .await
        .with_context(|| {
            format!("Failed to start synchronizer for {}", config.mock_dir.display())
        })?;

    let service = config.service(&synchronizer);
    info!(
        definitions = service.list_definitions().len(),
        route_policy = ?service.route_policy(),
        "Definition API ready"
    );

    cancel_token.cancelled().await;

    if synchronizer.shutdown().await == ShutdownOutcome::TimedOut {
        warn!("Shutdown timed out, exiting anyway");
    }

    info!("Dynamocker daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
