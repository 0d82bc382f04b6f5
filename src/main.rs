//! Zeppelin - Live Topology Stream for Gas Town
//!
//! Entry point: loads configuration, starts the collector and the HTTP
//! server, and shuts both down on Ctrl-C.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, Level};
use tracing_subscriber::EnvFilter;
use zeppelin_core::{
    error::Result, ApiServer, Collector, ConfigOverrides, EventBroker, ShellRunner,
    TopologyStore, ZeppelinConfig,
};

#[derive(Parser)]
#[command(name = "zeppelin")]
#[command(about = "Live topology stream for Gas Town", long_about = None)]
#[command(version)]
struct Cli {
    /// HTTP server port
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Gas Town root directory (default: ~/gt)
    #[arg(long)]
    root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of frontend assets to serve
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let level = level.as_str().to_lowercase();

    // Request spans from tower_http only at WARN
    let filter = EnvFilter::new(format!(
        "zeppelin={level},zeppelin_core={level},tower_http=warn"
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Zeppelin v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = ZeppelinConfig::load(
        cli.config.as_deref(),
        ConfigOverrides {
            bind: cli.bind,
            port: cli.port,
            root: cli.root,
            static_dir: cli.static_dir,
        },
    )?;
    info!(root = %config.root.display(), "Watching Gas Town");

    let store = Arc::new(TopologyStore::new());
    let broker = EventBroker::new(config.subscriber_capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let runner = Arc::new(ShellRunner::new(config.root.clone(), config.command_timeout()));
    let collector = Collector::new(runner, config.poll_interval());
    let collector_handle = tokio::spawn(collector.run(
        store.clone(),
        broker.clone(),
        shutdown_rx.clone(),
    ));

    let server = ApiServer::new(&config, store, broker)?;
    let mut server_shutdown = shutdown_rx;
    let mut server_handle = tokio::spawn(server.serve(async move {
        let _ = server_shutdown.changed().await;
    }));

    // A server that fails to bind ends the process without waiting for Ctrl-C
    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutting down...");
            let _ = shutdown_tx.send(true);
            server_handle.await
        }
        result = &mut server_handle => {
            let _ = shutdown_tx.send(true);
            result
        }
    };

    if let Err(e) = collector_handle.await {
        error!("Collector task failed: {}", e);
    }
    match server_result {
        Ok(result) => result,
        Err(e) => {
            error!("Server task failed: {}", e);
            Ok(())
        }
    }
}
