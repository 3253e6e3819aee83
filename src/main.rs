//! cdserver: KV gateway in front of etcd and Consul.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ routing ──▶ backend handler ──▶ etcd v2 / consul v1
//!                     (request id,    (/api/v2/id/,  (masks, policy,
//!                      timeout,        /api/v1/id/)   cache, flatten)
//!                      tracing)                            │
//!                                                          ▼
//!                                                    audit queue ──▶ collectors
//!
//!     /health, /metrics served beside the backend prefixes
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use confd::config::load_gateway_config;
use confd::fetch::Fetcher;
use confd::lifecycle::{spawn_signal_handler, Shutdown};
use confd::net::load_tls_config;
use confd::observability::logging::{init_logging, LogTarget};
use confd::observability::metrics::init_metrics;
use confd::{Gateway, HttpServer};

#[derive(Parser)]
#[command(name = "cdserver", version, about = "KV gateway with policy checks")]
struct Cli {
    /// Gateway configuration file.
    #[arg(short, long, default_value = "/etc/confd/cdserver.toml")]
    config: PathBuf,

    /// Overrides the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_gateway_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cdserver: {e}");
            std::process::exit(1);
        }
    };
    init_logging(&config.observability, cli.log_level.as_deref(), LogTarget::Stdout);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        backends = config.backends.len(),
        "cdserver starting"
    );

    let metrics = if config.observability.metrics_enabled {
        let standalone = config
            .observability
            .metrics_address
            .as_deref()
            .and_then(|addr| match addr.parse::<SocketAddr>() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::error!(metrics_address = %addr, error = %e, "Failed to parse metrics address");
                    None
                }
            });
        init_metrics(standalone)
    } else {
        None
    };

    let fetcher = Fetcher::new()?;
    let (gateway, flusher) = Gateway::from_config(&config, fetcher)?;

    let shutdown = Shutdown::new();
    spawn_signal_handler(None, Some(shutdown.clone()));

    let audit_task = flusher.map(|flusher| tokio::spawn(flusher.run(shutdown.subscribe())));

    let server = HttpServer::new(
        Arc::new(gateway),
        metrics,
        Duration::from_secs(config.global.request_timeout_secs),
    );

    match (&config.global.cert_file, &config.global.cert_key) {
        (Some(cert), Some(key)) => {
            let tls = load_tls_config(Path::new(cert), Path::new(key)).await?;
            let addr: SocketAddr = config.global.listen.parse()?;
            server.run_tls(addr, tls, shutdown.clone()).await?;
        }
        _ => {
            let listener = TcpListener::bind(&config.global.listen).await?;
            server.run(listener, shutdown.clone()).await?;
        }
    }

    if let Some(task) = audit_task {
        let _ = task.await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
