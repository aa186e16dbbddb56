//! CSP edge rewriter.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                    CSP EDGE                      │
//!                         │                                                  │
//!     Client Request      │  ┌─────────┐    ┌─────────┐    ┌─────────────┐  │
//!     ────────────────────┼─▶│listener │───▶│  http   │───▶│   forward   │──┼──▶ pinned
//!                         │  │TCP / TLS│    │ server  │    │ (Host kept) │  │    origin
//!                         │  └─────────┘    └─────────┘    └─────────────┘  │
//!                         │                                       │          │
//!     Client Response     │  ┌─────────────┐    ┌─────────────┐   │          │
//!     ◀───────────────────┼──│  rewrite    │◀───│ HTML gate   │◀──┘          │
//!                         │  │nonce + CSP  │    │ (pass other)│              │
//!                         │  └─────────────┘    └─────────────┘              │
//!                         │                                                  │
//!                         │  config (+ hot reload) · observability · signals │
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use csp_edge::config::{load_config, validate_config, ConfigError, ConfigWatcher, EdgeConfig};
use csp_edge::http::HttpServer;
use csp_edge::lifecycle::Shutdown;
use csp_edge::net::load_tls_config;
use csp_edge::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "csp-edge")]
#[command(about = "Edge proxy that pins an origin and injects CSP nonces into HTML", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override origin.address (IP:port of the pinned origin).
    #[arg(long)]
    origin: Option<String>,

    /// Override listener.bind_address.
    #[arg(long)]
    bind: Option<String>,

    /// Do not watch the configuration file for changes.
    #[arg(long)]
    no_watch: bool,
}

fn resolve_config(cli: &Cli) -> Result<EdgeConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => EdgeConfig::default(),
    };
    if let Some(origin) = &cli.origin {
        config.origin.address = origin.clone();
    }
    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init_logging(&config.observability);

    tracing::info!("csp-edge v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.origin.address,
        tls = config.listener.tls.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(error = %e, "Failed to start metrics endpoint");
        }
    }

    // Reloaded files get the --origin override applied again; the bind
    // address and TLS settings only take effect at startup.
    let (update_tx, config_updates) = mpsc::unbounded_channel();
    let _watcher = match &cli.config {
        Some(path) if !cli.no_watch => {
            let (watcher, mut reloaded) = ConfigWatcher::new(path);
            let origin = cli.origin.clone();
            tokio::spawn(async move {
                while let Some(mut next) = reloaded.recv().await {
                    if let Some(origin) = &origin {
                        next.origin.address = origin.clone();
                    }
                    if update_tx.send(next).is_err() {
                        break;
                    }
                }
            });
            Some(watcher.run()?)
        }
        _ => None,
    };

    let shutdown = Shutdown::new();
    tokio::spawn(shutdown.clone().trigger_on_signal());

    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config)?;

    match tls {
        Some(tls) => {
            let tls_config = load_tls_config(&tls).await?;
            let addr: SocketAddr = bind_address.parse()?;
            server
                .run_tls(addr, tls_config, config_updates, shutdown.subscribe())
                .await?;
        }
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            server
                .run(listener, config_updates, shutdown.subscribe())
                .await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
