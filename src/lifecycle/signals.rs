//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP only raises a flag; the scheduler consults it at the top of its loop
//! - Without a shutdown coordinator, SIGTERM/SIGINT exit the process at once

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::lifecycle::shutdown::Shutdown;

/// Coalescing "reload requested" flag shared by signals and the config watcher.
#[derive(Debug, Clone, Default)]
pub struct ReloadFlag(Arc<AtomicBool>);

impl ReloadFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns whether a reload was requested, clearing the flag.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Spawn the process signal listener.
///
/// With `shutdown` set, the first terminate signal triggers it and a second
/// one exits immediately; without it the process exits on the first.
pub fn spawn_signal_handler(reload: Option<ReloadFlag>, shutdown: Option<Shutdown>) {
    tokio::spawn(async move {
        let mut signals = match Signals::install() {
            Ok(signals) => signals,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        let mut terminations = 0u32;
        loop {
            match signals.next().await {
                Signal::Reload => match &reload {
                    Some(flag) => {
                        tracing::info!("SIGHUP received, reload scheduled");
                        flag.request();
                    }
                    None => tracing::info!("SIGHUP received, nothing to reload"),
                },
                Signal::Terminate => {
                    terminations += 1;
                    match &shutdown {
                        Some(shutdown) if terminations == 1 => {
                            tracing::info!("Termination signal received, shutting down");
                            shutdown.trigger();
                        }
                        _ => {
                            tracing::info!("Termination signal received, exiting");
                            std::process::exit(0);
                        }
                    }
                }
            }
        }
    });
}

enum Signal {
    Reload,
    Terminate,
}

#[cfg(unix)]
struct Signals {
    hup: tokio::signal::unix::Signal,
    term: tokio::signal::unix::Signal,
    int: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            hup: signal(SignalKind::hangup())?,
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
        })
    }

    async fn next(&mut self) -> Signal {
        tokio::select! {
            _ = self.hup.recv() => Signal::Reload,
            _ = self.term.recv() => Signal::Terminate,
            _ = self.int.recv() => Signal::Terminate,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> Signal {
        // ctrl_c only fails when the handler cannot be registered
        let _ = tokio::signal::ctrl_c().await;
        Signal::Terminate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_flag_coalesces() {
        let flag = ReloadFlag::new();
        assert!(!flag.take());

        flag.request();
        flag.clone().request();
        assert!(flag.take());
        assert!(!flag.take());
    }
}
