//! NodeHealth Agent - node-local health reporting
//!
//! This agent periodically reports host health to a local spool:
//! - Signal collection (heartbeat, CPU load, memory, disk)
//! - Threshold-based health assessment with stable reason tags
//! - Crash-safe JSON Lines spool with size-based rotation
//! - Durable per-node sequencing across restarts and reboots
//!
//! stdout carries structured events, plus report lines with `--emit-stdout`;
//! logs go to stderr.

mod agent;
mod collectors;
mod config;
mod evaluate;
mod events;
mod identity;
mod report;
mod spool;
mod state;

use agent::Agent;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use collectors::CollectorRegistry;
use config::{AgentConfig, CliOverrides};
use events::{RunMode, ShutdownReason, StdoutSink};
use std::path::PathBuf;
use std::process::ExitCode;
use sysinfo::System;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nodehealth-agent", version, about = "Node-local health reporting agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Tick on the configured interval until stopped or the iteration limit
    Run(RunArgs),
    /// Run a single tick; exits 1 if the report could not be written
    Oneshot(RunArgs),
    /// Print agent version and runtime environment
    Version,
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    /// Config file (default: <config dir>/nodehealth-agent/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Seconds between ticks
    #[arg(long)]
    interval_s: Option<f64>,
    /// Stop after N ticks
    #[arg(long)]
    iterations: Option<u64>,
    /// Override the node identity
    #[arg(long)]
    node_id: Option<String>,
    /// Spool file path
    #[arg(long)]
    spool: Option<PathBuf>,
    /// Directory for agent_state.json
    #[arg(long)]
    state_dir: Option<PathBuf>,
    /// Also print each spooled report to stdout
    #[arg(long)]
    emit_stdout: bool,
}

impl RunArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            interval_s: self.interval_s,
            iterations: self.iterations,
            node_id: self.node_id.clone(),
            spool: self.spool.clone(),
            state_dir: self.state_dir.clone(),
            emit_stdout: self.emit_stdout,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nodehealth_agent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Command::Version) => {
            print_version();
            Ok(ExitCode::SUCCESS)
        }
        Some(Command::Run(args)) => run_agent(args, Some(RunMode::Run)).await,
        Some(Command::Oneshot(args)) => run_agent(args, Some(RunMode::Oneshot)).await,
        None => run_agent(RunArgs::default(), None).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_agent(args: RunArgs, mode: Option<RunMode>) -> Result<ExitCode> {
    let mut config = AgentConfig::load(args.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    config.apply_env(|key| std::env::var(key).ok());
    config.apply_overrides(&args.overrides());
    config.validate().context("Invalid configuration")?;

    let mode = mode.unwrap_or(config.agent.mode);
    info!("NodeHealth agent v{} starting in {:?} mode", report::AGENT_VERSION, mode);

    let registry = CollectorRegistry::with_defaults(config.collectors.disk_path.clone());
    let mut agent = Agent::init(&config, mode, registry, StdoutSink);

    match mode {
        RunMode::Oneshot => {
            let outcome = agent.tick(true);
            agent.shutdown(ShutdownReason::IterationLimit);
            if outcome.emitted {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
        RunMode::Run => {
            let (stop_tx, stop_rx) = watch::channel(false);
            tokio::spawn(async move {
                wait_for_stop_signal().await;
                info!("Stop signal received");
                let _ = stop_tx.send(true);
            });

            agent.run(stop_rx).await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Resolves on ctrl-c, or SIGTERM on unix. Never resolves if no handler can be installed.
async fn wait_for_stop_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            warn!("ctrl-c handler failed: {}", e);
                            term.recv().await;
                        }
                    }
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("SIGTERM handler unavailable: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("ctrl-c handler failed: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_version() {
    let hostname = gethostname::gethostname().to_string_lossy().to_string();
    println!("agent_version={}", report::AGENT_VERSION);
    println!(
        "os={} {}",
        System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        System::os_version().unwrap_or_default()
    );
    println!("kernel={}", System::kernel_version().unwrap_or_default());
    println!("machine={}", std::env::consts::ARCH);
    println!("hostname={hostname}");
    println!("utc_now={}", report::format_timestamp(chrono::Utc::now()));
}
