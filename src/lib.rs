//! confd: configuration templating agent and KV gateway.
//!
//! `cdagent` renders local configuration files from remote JSON documents;
//! `cdserver` fronts etcd and Consul KV stores with policy checks.

pub mod agent;
pub mod config;
pub mod fetch;
pub mod gateway;
pub mod hash;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::{AgentConfig, GatewayConfig};
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
