//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGHUP → raise the reload flag (agent picks it up next cycle)
//!     SIGTERM/SIGINT → agent: exit immediately
//!                      gateway: trigger shutdown, second signal exits
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → audit flusher exits
//! ```
//!
//! # Design Decisions
//! - The agent does not drain in-flight jobs on termination
//! - Reload is a flag, not a channel: repeated signals coalesce

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, ReloadFlag};
