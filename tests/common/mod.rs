//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::StatusCode;
use confd::gateway::kv::{GetOptions, KvError, KvListing, KvNode, KvStore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as seen by a mock endpoint.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }
}

/// What a mock endpoint answers.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: Vec::new(),
            delay: None,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Handle on a running mock endpoint.
#[derive(Clone)]
pub struct MockEndpoint {
    pub url: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<MockRequest>>>,
}

impl MockEndpoint {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a programmable HTTP endpoint on an ephemeral loopback port.
pub async fn start_mock_endpoint<F>(handler: F) -> MockEndpoint
where
    F: Fn(&MockRequest) -> MockResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);
    let endpoint = MockEndpoint {
        url: format!("http://{addr}"),
        hits: Arc::new(AtomicUsize::new(0)),
        requests: Arc::new(Mutex::new(Vec::new())),
    };

    let state = endpoint.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let handler = handler.clone();
            let state = state.clone();
            tokio::spawn(async move {
                let _ = serve_one(socket, handler.as_ref(), &state).await;
            });
        }
    });
    endpoint
}

async fn serve_one<F>(mut socket: TcpStream, handler: &F, state: &MockEndpoint) -> std::io::Result<()>
where
    F: Fn(&MockRequest) -> MockResponse,
{
    let Some(request) = read_request(&mut socket).await? else {
        return Ok(());
    };
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.requests.lock().unwrap().push(request.clone());

    let response = handler(&request);
    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let reason = StatusCode::from_u16(response.status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let extra: String = response
        .headers
        .iter()
        .map(|(k, v)| format!("{k}: {v}\r\n"))
        .collect();
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
        response.status,
        reason,
        response.body.len(),
        extra
    );
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(&response.body).await?;
    socket.shutdown().await
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<Option<MockRequest>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Ok(Some(MockRequest {
        method,
        target,
        headers,
        body,
    }))
}

/// In-memory KV store. `None` values mark directories.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Option<String>>>,
}

impl MemoryStore {
    pub fn with_values(values: &[(&str, &str)]) -> Self {
        let store = Self::default();
        {
            let mut entries = store.entries.lock().unwrap();
            for (k, v) in values {
                entries.insert(k.to_string(), Some(v.to_string()));
            }
        }
        store
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned().flatten()
    }

    fn node(entries: &BTreeMap<String, Option<String>>, key: &str) -> Option<KvNode> {
        if let Some(Some(value)) = entries.get(key) {
            return Some(KvNode::Leaf {
                key: key.to_string(),
                value: value.clone(),
            });
        }

        let base = format!("{}/", key.trim_end_matches('/'));
        let names: BTreeSet<&str> = entries
            .keys()
            .filter_map(|k| k.strip_prefix(&base))
            .filter_map(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() && !entries.contains_key(key) && key != "/" {
            return None;
        }

        let children = names
            .into_iter()
            .filter_map(|name| Self::node(entries, &format!("{base}{name}")))
            .collect();
        Some(KvNode::Directory {
            key: key.to_string(),
            children,
        })
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str, _options: GetOptions) -> Result<KvListing, KvError> {
        let entries = self.entries.lock().unwrap();
        let root = Self::node(&entries, key).ok_or_else(|| KvError::NotFound(format!("100: Key not found ({key})")))?;
        let raw = serde_json::json!({"action": "get", "node": {"key": key}});
        Ok(KvListing {
            raw: serde_json::to_vec(&raw).unwrap(),
            root,
        })
    }

    async fn set(&self, key: &str, value: &str, dir: bool) -> Result<Vec<u8>, KvError> {
        let stored = (!dir).then(|| value.to_string());
        self.entries.lock().unwrap().insert(key.to_string(), stored);
        let answer = serde_json::json!({"action": "set", "node": {"key": key, "value": value, "dir": dir}});
        Ok(serde_json::to_vec(&answer).unwrap())
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<Vec<u8>, KvError> {
        let mut entries = self.entries.lock().unwrap();
        if entries.remove(key).is_none() && !recursive {
            return Err(KvError::NotFound(format!("100: Key not found ({key})")));
        }
        if recursive {
            let base = format!("{}/", key.trim_end_matches('/'));
            entries.retain(|k, _| !k.starts_with(&base));
        }
        Ok(serde_json::to_vec(&serde_json::json!({"action": "delete", "node": {"key": key}})).unwrap())
    }
}
