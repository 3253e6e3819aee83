//! Consul KV HTTP API client.
//!
//! Consul answers a recursive GET with a flat, sorted list of keys; the
//! tree is rebuilt here by splitting keys on `/`. Keys ending in `/` are
//! directory markers.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Method;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::fetch::{FetchRequest, Fetcher, RequestBody};
use crate::gateway::kv::{encode_key, status_error, GetOptions, KvError, KvListing, KvNode, KvStore, StoreEndpoint};

#[derive(Debug, Deserialize)]
struct ConsulEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value", default)]
    value: Option<String>,
}

#[derive(Debug, Default)]
struct Branch {
    leaves: BTreeMap<String, String>,
    dirs: BTreeMap<String, Branch>,
}

impl Branch {
    fn insert(&mut self, segments: &[&str], value: String) {
        match segments {
            [] => {}
            [name] => {
                if !name.is_empty() {
                    self.leaves.insert(name.to_string(), value);
                }
            }
            [dir, rest @ ..] => self.dirs.entry(dir.to_string()).or_default().insert(rest, value),
        }
    }

    fn into_nodes(self, base: &str) -> Vec<KvNode> {
        let mut nodes = Vec::with_capacity(self.leaves.len() + self.dirs.len());
        for (name, value) in self.leaves {
            if !self.dirs.contains_key(&name) {
                nodes.push(KvNode::Leaf {
                    key: format!("{base}{name}"),
                    value,
                });
            }
        }
        for (name, branch) in self.dirs {
            let key = format!("{base}{name}/");
            nodes.push(KvNode::Directory {
                children: branch.into_nodes(&key),
                key,
            });
        }
        nodes
    }
}

fn decode_value(value: Option<String>) -> Result<String, KvError> {
    match value {
        Some(encoded) => {
            let bytes = STANDARD
                .decode(encoded)
                .map_err(|e| KvError::Decode(e.to_string()))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        None => Ok(String::new()),
    }
}

/// Rebuild the tree under `prefix` (no leading slash) from a flat listing.
fn build_tree(prefix: &str, entries: Vec<ConsulEntry>) -> Result<KvNode, KvError> {
    if let [only] = entries.as_slice() {
        if only.key == prefix && !prefix.ends_with('/') && !prefix.is_empty() {
            let entry = entries.into_iter().next().map(|e| e.value).unwrap_or_default();
            return Ok(KvNode::Leaf {
                key: prefix.to_string(),
                value: decode_value(entry)?,
            });
        }
    }

    let base = if prefix.is_empty() || prefix.ends_with('/') {
        prefix.to_string()
    } else {
        format!("{prefix}/")
    };

    let mut root = Branch::default();
    for entry in entries {
        let Some(relative) = entry.key.strip_prefix(&base) else {
            // sibling keys sharing the prefix text, e.g. "app2" for "app"
            continue;
        };
        if relative.is_empty() {
            continue;
        }
        let segments: Vec<&str> = relative.split('/').collect();
        root.insert(&segments, decode_value(entry.value)?);
    }

    Ok(KvNode::Directory {
        children: root.into_nodes(&base),
        key: base,
    })
}

/// A Consul agent reached through its KV HTTP API.
pub struct ConsulStore {
    fetcher: Fetcher,
    endpoint: StoreEndpoint,
}

impl ConsulStore {
    pub fn new(fetcher: Fetcher, endpoint: StoreEndpoint) -> Self {
        Self { fetcher, endpoint }
    }

    fn request(&self, method: Method, key: &str) -> FetchRequest {
        FetchRequest::new(method, format!("/v1/kv{}", encode_key(key)), self.endpoint.timeout)
    }
}

fn consul_not_found(_: &[u8]) -> String {
    "Key not found".to_string()
}

#[async_trait]
impl KvStore for ConsulStore {
    async fn get(&self, key: &str, _options: GetOptions) -> Result<KvListing, KvError> {
        let request = self
            .request(Method::GET, key)
            .query("recurse", "true")
            .credentials(self.endpoint.read.clone());

        let response = self.fetcher.fetch(&self.endpoint.nodes, &request).await?;
        if !response.status.is_success() {
            return Err(status_error(&response, consul_not_found));
        }

        let entries: Vec<ConsulEntry> =
            serde_json::from_slice(&response.body).map_err(|e| KvError::Decode(e.to_string()))?;
        let prefix = key.trim_start_matches('/');
        Ok(KvListing {
            root: build_tree(prefix, entries)?,
            raw: response.body,
        })
    }

    async fn set(&self, key: &str, value: &str, dir: bool) -> Result<Vec<u8>, KvError> {
        let (key, body) = if dir {
            (format!("{}/", key.trim_end_matches('/')), Vec::new())
        } else {
            (key.to_string(), value.as_bytes().to_vec())
        };
        let request = self
            .request(Method::PUT, &key)
            .credentials(self.endpoint.write.clone())
            .body(RequestBody::Raw(body));

        let response = self.fetcher.fetch(&self.endpoint.nodes, &request).await?;
        if !response.status.is_success() {
            return Err(status_error(&response, consul_not_found));
        }
        Ok(response.body)
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<Vec<u8>, KvError> {
        let mut request = self
            .request(Method::DELETE, key)
            .credentials(self.endpoint.write.clone());
        if recursive {
            request = request.query("recurse", "true");
        }

        let response = self.fetcher.fetch(&self.endpoint.nodes, &request).await?;
        if !response.status.is_success() {
            return Err(status_error(&response, consul_not_found));
        }
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: Option<&str>) -> ConsulEntry {
        ConsulEntry {
            key: key.to_string(),
            value: value.map(|v| STANDARD.encode(v)),
        }
    }

    #[test]
    fn test_single_key_is_a_leaf() {
        let root = build_tree("app/flag", vec![entry("app/flag", Some("true"))]).unwrap();
        assert_eq!(root, KvNode::Leaf { key: "app/flag".into(), value: "true".into() });
    }

    #[test]
    fn test_prefix_listing_builds_tree() {
        let entries = vec![
            entry("app/", None),
            entry("app/conf/", None),
            entry("app/conf/port", Some("80")),
            entry("app/empty/", None),
            entry("app/flag", Some("true")),
            entry("app2/other", Some("x")),
        ];
        let root = build_tree("app", entries).unwrap();

        let KvNode::Directory { key, children } = root else {
            panic!("expected a directory");
        };
        assert_eq!(key, "app/");
        let names: Vec<&str> = children.iter().map(KvNode::name).collect();
        assert_eq!(names, vec!["flag", "conf", "empty"]);
        assert!(matches!(&children[2], KvNode::Directory { children, .. } if children.is_empty()));
        match &children[1] {
            KvNode::Directory { children, .. } => {
                assert_eq!(children[0], KvNode::Leaf { key: "app/conf/port".into(), value: "80".into() });
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_bad_base64_is_a_decode_error() {
        let entries = vec![ConsulEntry { key: "k".into(), value: Some("***".into()) }];
        assert!(matches!(build_tree("k", entries), Err(KvError::Decode(_))));
    }
}
