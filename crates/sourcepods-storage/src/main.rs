//! SourcePods storage gateway.
//!
//! Serves the repositories under `--root` over dumb and smart HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use sourcepods_storage::observability::init_logging;
use sourcepods_storage::{create_router, AppState, Config};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;

/// SourcePods storage - git over HTTP
#[derive(Parser, Debug)]
#[command(name = "sourcepods-storage")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long)]
    listen_addr: Option<SocketAddr>,

    /// Repository root directory
    #[arg(long)]
    root: Option<PathBuf>,

    /// Path of the git executable
    #[arg(long)]
    git_bin: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format
    #[arg(long, value_parser = ["pretty", "json"])]
    log_format: Option<String>,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(addr) = self.listen_addr {
            config.listen_addr = addr;
        }
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(git_bin) = self.git_bin {
            config.git_bin = git_bin;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;

    init_logging(&config.log_level, config.log_format());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting SourcePods storage");

    std::fs::create_dir_all(&config.root)
        .with_context(|| format!("failed to create {}", config.root.display()))?;

    let state = AppState::from_config(&config)
        .with_context(|| format!("failed to open repository root {}", config.root.display()))?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        root = %state.repos.path().display(),
        git_bin = %config.git_bin.display(),
        advertise_timeout_ms = config.advertise_timeout_ms,
        rpc_timeout_secs = ?config.rpc_timeout_secs,
        "Gateway configuration"
    );

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!(addr = %config.listen_addr, "Listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("SourcePods storage stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received shutdown signal");
}
