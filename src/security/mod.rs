//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming gateway request:
//!     → auth.rs (basic auth credentials, if any)
//!     → policy.rs (key masks, then the first matching check)
//!     → Pass to the KV store, or deny with 400/403
//! ```
//!
//! # Design Decisions
//! - Checks are compiled once at startup; bad patterns fail startup
//! - No matching check means allow; the decision is logged at debug

pub mod auth;
pub mod policy;

pub use auth::BasicAuth;
pub use policy::{AccessKind, Denial, KeyMasks, PolicyEngine, PolicyError, WriteParams};
