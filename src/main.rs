use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use jelly_metrics::agent::Agent;
use jelly_metrics::config::Config;

/// Prometheus exporter for Jellyfin session activity and library counts.
#[derive(Parser)]
#[command(name = "jelly-metrics", about)]
struct Cli {
    /// Path to an optional YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    /// Overrides `log_level` from the configuration file.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Version) = &cli.command {
        println!("jelly-metrics {}", version::full());
        return Ok(());
    }

    let cfg = Config::from_sources(cli.config.as_deref(), |key| std::env::var(key).ok())
        .context("loading configuration")?;

    // Initialize tracing.
    let log_level = cli.log_level.as_deref().unwrap_or(cfg.log_level.as_str());
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("invalid log level: {log_level}"))?;

    fmt().with_env_filter(filter).with_target(true).init();

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting jelly-metrics",
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

async fn run(cfg: Config) -> Result<()> {
    // Set up signal handling.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(());
    });

    // Credential validation happens here; failure exits non-zero before
    // anything is served.
    let mut agent = Agent::new(cfg)?;
    agent.start().await?;

    let _ = shutdown_rx.await;

    agent.stop().await?;

    tracing::info!("jelly-metrics stopped");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received SIGINT, shutting down");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received Ctrl-C, shutting down");
}
