//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming path /api/{version}/{id}/{key...}
//!     → router.rs (prefix lookup)
//!     → matcher.rs (segment-aware prefix strip)
//!     → Return: backend handler + key, or no match
//!
//! Route Compilation (at startup):
//!     BackendConfig[]
//!     → /api/{version}/{id}/ prefixes
//!     → Sort by prefix length
//!     → Freeze as immutable router
//! ```

pub mod matcher;
pub mod router;

pub use matcher::PathPrefixMatcher;
pub use router::{PrefixRouter, RouteMatch};
