//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, timeout, tracing)
//!     → request.rs (custom headers, form and query parsing)
//!     → [gateway picks backend and answers]
//!     → response.rs (errors as {errorCode, message, cause})
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{X_CUSTOM_FORMAT, X_CUSTOM_HASH, X_REQUEST_ID};
pub use response::GatewayError;
pub use server::HttpServer;
