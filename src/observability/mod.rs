//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and histograms)
//!
//! Consumers:
//!     → stdout/stderr log lines
//!     → Prometheus scrape (/metrics on the gateway, optional agent listener)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every gateway log line
//! - Metrics are cheap (atomic increments behind the `metrics` facade)
//! - The agent keeps stdout clean in plugin mode; logs go to stderr

pub mod logging;
pub mod metrics;
