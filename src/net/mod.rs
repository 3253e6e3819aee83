//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! cdserver startup
//!     → cert_file/cert_key both set? → tls.rs (load PEM pair) → HTTPS listener
//!     → otherwise plain TCP listener
//!     → Hand off to the HTTP layer
//! ```

pub mod tls;

pub use tls::load_tls_config;
