//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level, which loses to `--log-level`.

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    /// Used in plugin mode, where stdout carries telemetry.
    Stderr,
}

fn writer(target: LogTarget) -> BoxMakeWriter {
    match target {
        LogTarget::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogTarget::Stderr => BoxMakeWriter::new(std::io::stderr),
    }
}

/// Resolve the filter directive: env, then CLI override, then config.
pub fn filter_for(config: &ObservabilityConfig, level_override: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level_override.unwrap_or(&config.log_level);
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init_logging(config: &ObservabilityConfig, level_override: Option<&str>, target: LogTarget) {
    let registry = tracing_subscriber::registry().with(filter_for(config, level_override));

    let result = match config.log_format.as_str() {
        "pretty" => registry
            .with(fmt::layer().pretty().with_writer(writer(target)))
            .try_init(),
        _ => registry
            .with(fmt::layer().compact().with_writer(writer(target)))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}
