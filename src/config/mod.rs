//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AgentConfig / GatewayConfig (validated, immutable)
//!
//! On reload (SIGHUP or watcher.rs):
//!     reload flag raised
//!     → scheduler reloads at the next cycle boundary
//!     → loader.rs + validation.rs
//!     → atomic swap of the job set; the old set is kept on failure
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_agent_config, load_checks_file, load_gateway_config, ConfigError};
pub use schema::{
    AccessConfig, AgentConfig, AgentGlobalConfig, BackendConfig, BackendKind, CheckConfig,
    DirConstraint, GatewayConfig, GatewayGlobalConfig, ObservabilityConfig, ScheduleMode,
    TemplateConfig,
};
