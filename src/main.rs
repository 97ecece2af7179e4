//! darkvisitors-proxy
//!
//! A reverse proxy that reports every handled request to the Dark Visitors
//! agent analytics API.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ trace ─▶ request id ─▶ timeout ─▶ error map ─▶ darkvisitors ─▶ forward ──▶ Upstream
//!                                                                 │
//!                                                                 └─ spawn ─▶ POST /visits (Bearer)
//!
//!   Cross-cutting: config (TOML + block syntax, hot reload), lifecycle, observability
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use darkvisitors_proxy::config::{load_config, watcher::ConfigWatcher};
use darkvisitors_proxy::lifecycle::{wait_for_signal, Shutdown};
use darkvisitors_proxy::observability::{logging, metrics};
use darkvisitors_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "darkvisitors-proxy", version)]
#[command(about = "Reverse proxy reporting visits to the Dark Visitors API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy
    Run {
        #[arg(short, long, default_value = "proxy.toml")]
        config: PathBuf,

        /// Reload routes and visit settings when the config file changes
        #[arg(long)]
        watch: bool,
    },
    /// Load and validate a config file, then exit
    Check {
        #[arg(short, long, default_value = "proxy.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { config } => check(&config),
        Commands::Run { config, watch } => run(&config, watch).await,
    }
}

fn check(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path).map_err(|e| format!("{}: {}", path.display(), e))?;

    println!("{}: ok", path.display());
    println!("  listener: {}", config.listener.bind_address);
    println!("  routes:   {}", config.routes.len());
    match &config.darkvisitors {
        Some(visits) => println!("  visits:   {} (token set)", visits.endpoint),
        None => println!("  visits:   disabled"),
    }
    Ok(())
}

async fn run(path: &Path, watch: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path).map_err(|e| format!("{}: {}", path.display(), e))?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "darkvisitors-proxy starting");

    match &config.darkvisitors {
        Some(visits) => tracing::info!(endpoint = %visits.endpoint, "Visit reporting enabled"),
        None => tracing::warn!("No darkvisitors configuration, visit reporting disabled"),
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = if watch {
        let (watcher, updates) = ConfigWatcher::new(path, &config);
        (Some(watcher.run()?), updates)
    } else {
        let (_, updates) = mpsc::unbounded_channel();
        (None, updates)
    };

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let mut server_task = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => {
            result??;
            return Ok(());
        }
        _ = wait_for_signal() => {}
    }

    shutdown.trigger();
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
