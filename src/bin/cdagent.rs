//! cdagent: renders local configuration files from remote JSON documents.
//!
//! Modes:
//! - daemon (default): run the configured jobs on their schedule
//! - `--plugin NAME`: one cycle, telemetry lines on stdout, exit 0
//! - `--src-file/--src-tmpl/--dest-file`: render one file and exit

use clap::Parser;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use confd::agent::template_check;
use confd::agent::writer::{reconcile, Reconcile};
use confd::agent::{render::render_file, AgentContext, HandlebarsRenderer, JobSet, Scheduler, TemplateRenderer};
use confd::config::watcher::ConfigWatcher;
use confd::config::{load_agent_config, ObservabilityConfig};
use confd::fetch::Fetcher;
use confd::lifecycle::{spawn_signal_handler, ReloadFlag, Shutdown};
use confd::observability::logging::{init_logging, LogTarget};
use confd::observability::metrics::init_metrics;

#[derive(Parser)]
#[command(name = "cdagent", version, about = "Configuration templating agent")]
struct Cli {
    /// Agent configuration file.
    #[arg(short, long, default_value = "/etc/confd/cdagent.toml")]
    config: PathBuf,

    /// Overrides the configured interval, in seconds.
    #[arg(short, long)]
    interval: Option<u64>,

    /// Run one cycle and print telemetry lines (e.g. `telegraf`).
    #[arg(long)]
    plugin: Option<String>,

    /// JSON document for one-shot rendering.
    #[arg(long, requires_all = ["src_tmpl", "dest_file"])]
    src_file: Option<PathBuf>,

    /// Template for one-shot rendering.
    #[arg(long, requires_all = ["src_file", "dest_file"])]
    src_tmpl: Option<PathBuf>,

    /// Output of one-shot rendering.
    #[arg(long, requires_all = ["src_file", "src_tmpl"])]
    dest_file: Option<PathBuf>,

    /// Serve the template check endpoint on this address.
    #[arg(long)]
    listen_address: Option<SocketAddr>,

    /// Reload when the config file changes.
    #[arg(long)]
    watch: bool,

    /// Overrides the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let (Some(data), Some(template), Some(dest)) = (&cli.src_file, &cli.src_tmpl, &cli.dest_file) {
        init_logging(&ObservabilityConfig::default(), cli.log_level.as_deref(), LogTarget::Stderr);
        if let Err(e) = render_once(data, template, dest).await {
            eprintln!("cdagent: {e}");
            std::process::exit(1);
        }
        return Ok(());
    }

    let config = match load_agent_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cdagent: {e}");
            std::process::exit(1);
        }
    };

    let target = if cli.plugin.is_some() {
        LogTarget::Stderr
    } else {
        LogTarget::Stdout
    };
    init_logging(&config.observability, cli.log_level.as_deref(), target);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        templates = config.templates.len(),
        "cdagent starting"
    );

    if config.observability.metrics_enabled {
        if let Some(addr) = config.observability.metrics_address.as_deref() {
            match addr.parse::<SocketAddr>() {
                Ok(addr) => {
                    init_metrics(Some(addr));
                }
                Err(e) => tracing::error!(metrics_address = %addr, error = %e, "Failed to parse metrics address"),
            }
        }
    }

    let interval = cli.interval.map(Duration::from_secs);
    let jobs = JobSet::from_config(&config, interval)?;
    let renderer: Arc<dyn TemplateRenderer> = Arc::new(HandlebarsRenderer::new());
    let ctx = Arc::new(AgentContext::new(Fetcher::new()?, renderer.clone(), cli.plugin.is_some()));
    let reload = ReloadFlag::new();
    let scheduler = Scheduler::new(ctx, jobs, reload.clone()).with_config_source(cli.config.clone(), interval);

    if let Some(plugin) = &cli.plugin {
        tracing::info!(plugin = %plugin, "Running a single cycle");
        scheduler.run_once().await;
        return Ok(());
    }

    spawn_signal_handler(Some(reload.clone()), None);

    let _watcher = if cli.watch {
        match ConfigWatcher::new(&cli.config, reload).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::error!(error = %e, "Config watcher failed to start");
                None
            }
        }
    } else {
        None
    };

    if let Some(addr) = cli.listen_address {
        let router = template_check::router(PathBuf::from(&config.global.templates_dir), renderer);
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(address = %addr, "Template check endpoint listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "Template check endpoint stopped");
            }
        });
    }

    // Termination exits the process directly; the sender only has to outlive the loop.
    let shutdown = Shutdown::new();
    scheduler.run(shutdown.subscribe()).await;
    Ok(())
}

async fn render_once(data: &Path, template: &Path, dest: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = tokio::fs::read(data).await.map_err(|e| format!("reading {}: {e}", data.display()))?;
    let document: Value = serde_json::from_slice(&text).map_err(|e| format!("parsing {}: {e}", data.display()))?;

    let artifact = render_file(&HandlebarsRenderer::new(), template, &document).await?;
    match reconcile(dest, dest, &artifact).await? {
        Reconcile::Changed => tracing::info!(dest = %dest.display(), "Config written"),
        Reconcile::Unchanged => tracing::info!(dest = %dest.display(), "Config unchanged"),
    }
    Ok(())
}
