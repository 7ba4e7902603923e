//! Edge proxy binary.
//!
//! ```text
//!   caller ──▶ axum server ──▶ forwarding engine ──▶ upstream origin
//!                 │              │  route lookup (longest prefix)
//!                 │              │  in-flight limit
//!                 │              │  header pipeline
//!   caller ◀──────┴──────────────┴── streamed response body
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_proxy::config::watcher::{reload_file, ConfigWatcher};
use edge_proxy::config::{load_config, validate_config, ProxyConfig};
use edge_proxy::lifecycle::{next_signal, Shutdown, SignalEvent};
use edge_proxy::observability::{logging, metrics};
use edge_proxy::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "edge-proxy", version, about = "Path-prefix reverse proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => ProxyConfig::default(),
    };
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("config error: {error}");
        }
        bail!("configuration rejected with {} error(s)", errors.len());
    }
    if cli.check {
        println!("configuration OK ({} routes)", config.routes.len());
        return Ok(());
    }

    logging::init_logging(&config.observability).context("installing log subscriber")?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-proxy starting");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .context("parsing metrics address")?;
        metrics::init_metrics(addr).context("starting metrics exporter")?;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        headers_timeout_secs = config.timeouts.headers_secs,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .with_context(|| format!("binding {}", config.listener.bind_address))?;

    let (update_tx, update_rx) = mpsc::unbounded_channel();
    let _watcher = match (&cli.config, config.reload.enabled) {
        (Some(path), true) => {
            let interval = Duration::from_secs(config.reload.poll_interval_secs);
            Some(
                ConfigWatcher::with_sender(path, interval, update_tx.clone())
                    .run()
                    .context("starting config watcher")?,
            )
        }
        _ => None,
    };

    let server = HttpServer::new(&config).context("building forwarding engine")?;
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let mut serving = tokio::spawn(server.run(listener, update_rx, server_shutdown));

    loop {
        tokio::select! {
            signal = next_signal() => match signal.context("installing signal handlers")? {
                SignalEvent::Shutdown => {
                    tracing::info!("Shutdown signal received, draining");
                    break;
                }
                SignalEvent::Reload => reload_from_file(cli.config.as_deref(), &update_tx),
            },
            result = &mut serving => {
                result.context("server task panicked")??;
                return Ok(());
            }
        }
    }

    shutdown.trigger();
    serving.await.context("server task panicked")??;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Re-read the config file on SIGHUP and queue it for the server.
fn reload_from_file(path: Option<&Path>, updates: &mpsc::UnboundedSender<ProxyConfig>) {
    let Some(path) = path else {
        tracing::warn!("SIGHUP received but no config file was given, ignoring");
        return;
    };
    tracing::info!(path = %path.display(), "SIGHUP received, reloading routing table");
    reload_file(path, updates);
}
