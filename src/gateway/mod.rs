//! KV gateway.
//!
//! # Data Flow
//! ```text
//! /api/{version}/{id}/{key...}
//!     → routing (prefix → BackendHandler)
//!     → handler.rs (masks, policy, dispatch)
//!     → kv/ (etcd v2 or consul v1 over HTTP)
//!     → flatten.rs (key tree → nested JSON), cache.rs
//!     → audit.rs (one record per request, flushed in batches)
//! ```

pub mod audit;
pub mod cache;
pub mod flatten;
pub mod handler;
pub mod kv;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::fetch::Fetcher;
use crate::routing::{PrefixRouter, RouteMatch};
use crate::security::PolicyError;

pub use audit::{Action, AuditFlusher, AuditQueue};
pub use handler::{BackendHandler, BackendRequest};

#[derive(Debug, Error)]
pub enum GatewayBuildError {
    #[error("backend {backend}: {source}")]
    Policy {
        backend: String,
        #[source]
        source: PolicyError,
    },

    #[error("duplicate backend prefix {0}")]
    DuplicatePrefix(String),
}

/// All configured backends keyed by URL prefix.
#[derive(Default)]
pub struct Gateway {
    backends: PrefixRouter<BackendHandler>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every backend; the flusher is returned when audit collectors are set.
    pub fn from_config(config: &GatewayConfig, fetcher: Fetcher) -> Result<(Self, Option<AuditFlusher>), GatewayBuildError> {
        let users = Arc::new(config.global.users.clone());
        let timeout = Duration::from_secs(config.global.backend_timeout_secs);

        let (audit, flusher) = if config.global.audit_urls.is_empty() {
            (None, None)
        } else {
            let (queue, rx) = AuditQueue::new(config.global.audit_queue_size);
            let flusher = AuditFlusher::new(
                rx,
                config.global.audit_urls.clone(),
                fetcher.clone(),
                Duration::from_secs(config.global.audit_flush_secs),
            );
            (Some(queue), Some(flusher))
        };

        let mut gateway = Self::new();
        for backend in &config.backends {
            let mut handler = BackendHandler::from_config(backend, users.clone(), fetcher.clone(), timeout)
                .map_err(|source| GatewayBuildError::Policy {
                    backend: backend.id.clone(),
                    source,
                })?;
            if let Some(queue) = &audit {
                handler = handler.with_audit(queue.clone());
            }
            let prefix = format!("/api/{}/", handler.name());
            gateway.add_backend(&prefix, handler)?;
        }
        Ok((gateway, flusher))
    }

    pub fn add_backend(&mut self, prefix: &str, handler: BackendHandler) -> Result<(), GatewayBuildError> {
        tracing::info!(prefix = %prefix, "Backend registered");
        if self.backends.insert(prefix, Arc::new(handler)) {
            Ok(())
        } else {
            Err(GatewayBuildError::DuplicatePrefix(prefix.to_string()))
        }
    }

    pub fn route(&self, path: &str) -> Option<RouteMatch<BackendHandler>> {
        self.backends.lookup(path)
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }
}
