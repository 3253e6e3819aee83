//! KV store clients behind the gateway.
//!
//! Both stores are reduced to the same [`KvNode`] tree so flattening and
//! caching do not care which one answered.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::fetch::{Credentials, FetchError, FetchResult};

pub mod consul;
pub mod etcd;

pub use consul::ConsulStore;
pub use etcd::EtcdStore;

/// A node of a key listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvNode {
    Leaf { key: String, value: String },
    Directory { key: String, children: Vec<KvNode> },
}

impl KvNode {
    pub fn key(&self) -> &str {
        match self {
            KvNode::Leaf { key, .. } | KvNode::Directory { key, .. } => key,
        }
    }

    /// Last path segment of the key.
    pub fn name(&self) -> &str {
        self.key()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

/// A GET answer: the store's own bytes plus the decoded tree.
#[derive(Debug, Clone)]
pub struct KvListing {
    pub raw: Vec<u8>,
    pub root: KvNode,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    pub recursive: bool,
    pub sorted: bool,
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("{0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    Unavailable(#[from] FetchError),

    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid backend response: {0}")]
    Decode(String),
}

/// GET/PUT/DELETE on a key-value store. Write results are the store's raw
/// response, echoed to the gateway client.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str, options: GetOptions) -> Result<KvListing, KvError>;

    async fn set(&self, key: &str, value: &str, dir: bool) -> Result<Vec<u8>, KvError>;

    async fn delete(&self, key: &str, recursive: bool) -> Result<Vec<u8>, KvError>;
}

/// Nodes, credentials and timeout of an HTTP-based store.
#[derive(Debug, Clone)]
pub struct StoreEndpoint {
    pub nodes: Vec<String>,
    pub read: Option<Credentials>,
    pub write: Option<Credentials>,
    pub timeout: Duration,
}

/// Characters left as is in a key segment of a store URL.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Key path with exactly one leading slash.
pub(crate) fn normalize_key(key: &str) -> String {
    format!("/{}", key.trim_start_matches('/'))
}

/// Normalized key with every segment percent-encoded for a store URL.
pub(crate) fn encode_key(key: &str) -> String {
    normalize_key(key)
        .split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Map a non-success store answer to an error.
pub(crate) fn status_error(response: &FetchResult, not_found: impl FnOnce(&[u8]) -> String) -> KvError {
    if response.status == StatusCode::NOT_FOUND {
        KvError::NotFound(not_found(&response.body))
    } else {
        KvError::Rejected {
            status: response.status.as_u16(),
            message: String::from_utf8_lossy(&response.body).trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_names() {
        let leaf = KvNode::Leaf { key: "/app/flag".into(), value: "true".into() };
        let dir = KvNode::Directory { key: "app/conf/".into(), children: vec![] };
        assert_eq!(leaf.name(), "flag");
        assert_eq!(dir.name(), "conf");
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("app/flag"), "/app/flag");
        assert_eq!(normalize_key("//app"), "/app");
        assert_eq!(normalize_key(""), "/");
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("/app/flag"), "/app/flag");
        assert_eq!(encode_key("app/conf/"), "/app/conf/");
        assert_eq!(encode_key("/my key/a?b#c"), "/my%20key/a%3Fb%23c");
        assert_eq!(encode_key("/100%"), "/100%25");
    }
}
