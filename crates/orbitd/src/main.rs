//! orbitd: the Orbit daemon.
//!
//! Opens the state store named by `orbit.toml` and runs the controller's
//! periodic maintainers:
//! - name service dispatcher, draining queued DNS changes
//! - version status maintainer, pruning obsolete platform versions
//!
//! # Usage
//!
//! ```text
//! orbitd run --config /etc/orbit/orbit.toml
//! orbitd status --config /etc/orbit/orbit.toml
//! ```

mod maintainers;
mod status;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use orbit_core::OrbitConfig;
use orbit_routing::{MemoryNameService, NameServiceDispatcher};
use orbit_state::StateStore;
use orbit_version::VersionStatusMaintainer;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser)]
#[command(name = "orbitd", about = "Orbit deployment controller daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the background maintainers until interrupted.
    Run {
        /// Path to orbit.toml.
        #[arg(long, default_value = "/etc/orbit/orbit.toml")]
        config: PathBuf,

        /// DNS queue dispatch interval in seconds.
        #[arg(long, default_value = "10")]
        dispatch_interval: u64,

        /// Version status maintenance interval in seconds.
        #[arg(long, default_value = "3600")]
        version_interval: u64,

        /// Log as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Print a JSON summary of the persisted state.
    Status {
        #[arg(long, default_value = "/etc/orbit/orbit.toml")]
        config: PathBuf,
    },
    /// Print the effective configuration.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_json = matches!(cli.command, Command::Run { log_json: true, .. });
    init_tracing(log_json);

    match cli.command {
        Command::Run {
            config,
            dispatch_interval,
            version_interval,
            ..
        } => run(&config, dispatch_interval, version_interval).await,
        Command::Status { config } => {
            let store = open_store(&OrbitConfig::from_file(&config)?)?;
            let summary = status::summary(&store)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Config { config } => {
            let config = match config {
                Some(path) => OrbitConfig::from_file(&path)?,
                None => OrbitConfig::default(),
            };
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,orbitd=debug,orbit=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(config: &OrbitConfig) -> anyhow::Result<StateStore> {
    let path = &config.store.path;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let store = StateStore::open(path)?
        .with_lock_timeout(Duration::from_secs(config.locks.timeout_secs));
    info!(path = ?path, "state store opened");
    Ok(store)
}

async fn run(config_path: &Path, dispatch_interval: u64, version_interval: u64) -> anyhow::Result<()> {
    let config = OrbitConfig::from_file(config_path)?;
    info!(system = %config.system.name, zones = config.zones.len(), "Orbit daemon starting");

    let store = open_store(&config)?;

    // ── Maintainers ────────────────────────────────────────────

    // Single-node setups resolve names in memory.
    let name_service = Arc::new(MemoryNameService::new());
    let dispatcher = NameServiceDispatcher::new(
        store.clone(),
        name_service,
        config.routing.name_service_queue_capacity,
    );
    let versions = VersionStatusMaintainer::new(store.clone());

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dispatch_handle = tokio::spawn(maintainers::run(
        Arc::new(dispatcher),
        Duration::from_secs(dispatch_interval),
        shutdown_rx.clone(),
    ));
    let version_handle = tokio::spawn(maintainers::run(
        Arc::new(versions),
        Duration::from_secs(version_interval),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = dispatch_handle.await;
    let _ = version_handle.await;

    info!("Orbit daemon stopped");
    Ok(())
}
