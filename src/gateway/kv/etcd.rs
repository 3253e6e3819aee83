//! etcd v2 keys API client.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use crate::fetch::{FetchRequest, Fetcher, RequestBody};
use crate::gateway::kv::{encode_key, status_error, GetOptions, KvError, KvListing, KvNode, KvStore, StoreEndpoint};

#[derive(Debug, Deserialize)]
struct EtcdResponse {
    node: EtcdNode,
}

#[derive(Debug, Deserialize)]
struct EtcdNode {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    nodes: Vec<EtcdNode>,
}

impl EtcdNode {
    fn into_kv(self) -> KvNode {
        let key = self.key.unwrap_or_else(|| "/".to_string());
        if self.dir {
            KvNode::Directory {
                key,
                children: self.nodes.into_iter().map(EtcdNode::into_kv).collect(),
            }
        } else {
            KvNode::Leaf {
                key,
                value: self.value.unwrap_or_default(),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct EtcdError {
    #[serde(rename = "errorCode")]
    error_code: u32,
    message: String,
    #[serde(default)]
    cause: String,
}

fn not_found_message(body: &[u8]) -> String {
    match serde_json::from_slice::<EtcdError>(body) {
        Ok(e) => format!("{}: {} ({})", e.error_code, e.message, e.cause),
        Err(_) => "100: Key not found".to_string(),
    }
}

/// An etcd cluster reached through its v2 HTTP API.
pub struct EtcdStore {
    fetcher: Fetcher,
    endpoint: StoreEndpoint,
}

impl EtcdStore {
    pub fn new(fetcher: Fetcher, endpoint: StoreEndpoint) -> Self {
        Self { fetcher, endpoint }
    }

    fn request(&self, method: Method, key: &str) -> FetchRequest {
        FetchRequest::new(method, format!("/v2/keys{}", encode_key(key)), self.endpoint.timeout)
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn get(&self, key: &str, options: GetOptions) -> Result<KvListing, KvError> {
        let mut request = self
            .request(Method::GET, key)
            .credentials(self.endpoint.read.clone());
        if options.recursive {
            request = request.query("recursive", "true");
        }
        if options.sorted {
            request = request.query("sorted", "true");
        }

        let response = self.fetcher.fetch(&self.endpoint.nodes, &request).await?;
        if !response.status.is_success() {
            return Err(status_error(&response, not_found_message));
        }

        let decoded: EtcdResponse =
            serde_json::from_slice(&response.body).map_err(|e| KvError::Decode(e.to_string()))?;
        Ok(KvListing {
            raw: response.body,
            root: decoded.node.into_kv(),
        })
    }

    async fn set(&self, key: &str, value: &str, dir: bool) -> Result<Vec<u8>, KvError> {
        let form = if dir {
            vec![("dir".to_string(), "true".to_string())]
        } else {
            vec![("value".to_string(), value.to_string())]
        };
        let request = self
            .request(Method::PUT, key)
            .credentials(self.endpoint.write.clone())
            .body(RequestBody::Form(form));

        let response = self.fetcher.fetch(&self.endpoint.nodes, &request).await?;
        if !response.status.is_success() {
            return Err(status_error(&response, not_found_message));
        }
        Ok(response.body)
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<Vec<u8>, KvError> {
        let mut request = self
            .request(Method::DELETE, key)
            .credentials(self.endpoint.write.clone());
        if recursive {
            request = request.query("recursive", "true");
        }

        let response = self.fetcher.fetch(&self.endpoint.nodes, &request).await?;
        if !response.status.is_success() {
            return Err(status_error(&response, not_found_message));
        }
        Ok(response.body)
    }
}
