//! Audit trail of gateway requests.
//!
//! # Delivery
//! ```text
//! handler ──try_send──▶ [bounded mpsc] ──drain every tick──▶ POST batch to each collector
//! ```
//! Enqueue never blocks: a full queue drops the new record. A failed POST
//! is logged and the batch is not retried.

use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::fetch::{FetchRequest, Fetcher, RequestBody};
use crate::observability::metrics;

const POST_TIMEOUT: Duration = Duration::from_secs(5);

/// One audited gateway request.
#[derive(Debug, Clone, Serialize)]
pub struct Action {
    pub id: Uuid,
    pub login: String,
    /// HTTP method.
    pub action: String,
    /// Key path.
    pub object: String,
    pub attributes: BTreeMap<String, String>,
    pub description: String,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

impl Action {
    pub fn new(login: Option<&str>, method: &str, key: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            login: login.unwrap_or_default().to_string(),
            action: method.to_string(),
            object: key.to_string(),
            attributes: BTreeMap::new(),
            description: String::new(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    pub fn attribute(mut self, name: &str, value: impl ToString) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Serialize)]
struct Batch<'a> {
    actions: &'a [Action],
}

/// Producer side, cloned into every backend handler.
#[derive(Debug, Clone)]
pub struct AuditQueue {
    tx: mpsc::Sender<Action>,
}

impl AuditQueue {
    /// Create a queue holding at most `capacity` records.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Action>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting. Returns false if the record was dropped.
    pub fn push(&self, action: Action) -> bool {
        match self.tx.try_send(action) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(action)) => {
                tracing::warn!(object = %action.object, "Audit queue full, dropping record");
                metrics::record_audit_dropped();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Audit flusher stopped, dropping record");
                false
            }
        }
    }
}

/// Consumer side: owns the receiver and the collector URLs.
pub struct AuditFlusher {
    rx: mpsc::Receiver<Action>,
    urls: Vec<String>,
    fetcher: Fetcher,
    interval: Duration,
}

impl AuditFlusher {
    pub fn new(rx: mpsc::Receiver<Action>, urls: Vec<String>, fetcher: Fetcher, interval: Duration) -> Self {
        Self {
            rx,
            urls,
            fetcher,
            interval,
        }
    }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<Action> {
        let mut batch = Vec::new();
        while let Ok(action) = self.rx.try_recv() {
            batch.push(action);
        }
        batch
    }

    /// Send the current queue contents to every collector.
    pub async fn flush(&mut self) -> usize {
        let batch = self.drain();
        if batch.is_empty() {
            return 0;
        }

        let body = match serde_json::to_vec(&Batch { actions: &batch }) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode audit batch");
                return 0;
            }
        };

        for url in &self.urls {
            let request = FetchRequest::new(Method::POST, "", POST_TIMEOUT)
                .header("Content-Type", "application/json")
                .body(RequestBody::Raw(body.clone()));
            match self.fetcher.fetch(std::slice::from_ref(url), &request).await {
                Ok(response) if response.status.is_success() => {
                    tracing::debug!(url = %url, records = batch.len(), "Audit batch delivered");
                }
                Ok(response) => {
                    tracing::warn!(url = %url, status = %response.status, "Audit collector rejected batch");
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "Audit delivery failed"),
            }
        }
        batch.len()
    }

    /// Flush on every tick until shutdown, then flush once more.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush().await;
                }
                _ = shutdown.recv() => {
                    self.flush().await;
                    tracing::info!("Audit flusher stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(key: &str) -> Action {
        Action::new(Some("ops"), "PUT", key).attribute("code", 200)
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (queue, rx) = AuditQueue::new(2);
        assert!(queue.push(action("/a")));
        assert!(queue.push(action("/b")));
        assert!(!queue.push(action("/c")));

        let mut flusher = AuditFlusher::new(rx, vec![], Fetcher::new().unwrap(), Duration::from_secs(5));
        let drained: Vec<String> = flusher.drain().into_iter().map(|a| a.object).collect();
        assert_eq!(drained, vec!["/a", "/b"]);
        assert!(flusher.drain().is_empty());
    }

    #[test]
    fn test_batch_shape() {
        let batch = [action("/app/flag").describe("ok")];
        let json = serde_json::to_value(Batch { actions: &batch }).unwrap();
        assert_eq!(json["actions"][0]["login"], "ops");
        assert_eq!(json["actions"][0]["action"], "PUT");
        assert_eq!(json["actions"][0]["attributes"]["code"], "200");
    }

    #[tokio::test]
    async fn test_flush_without_collectors_still_drains() {
        let (queue, rx) = AuditQueue::new(4);
        queue.push(action("/a"));
        let mut flusher = AuditFlusher::new(rx, vec![], Fetcher::new().unwrap(), Duration::from_secs(5));
        assert_eq!(flusher.flush().await, 1);
        assert_eq!(flusher.flush().await, 0);
    }
}
