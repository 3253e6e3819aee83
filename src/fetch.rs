//! Multi-endpoint HTTP fetching.
//!
//! # Responsibilities
//! - Try a shuffled list of replicas until one gives a definitive answer
//! - Bound every attempt by the caller's timeout
//! - Hash the body once so callers never re-hash it
//!
//! # Design Decisions
//! - 5xx, connection errors and timeouts move on to the next endpoint
//! - Any other status, 4xx included, ends the loop and is returned as is
//! - A run where every attempt timed out reports a timeout, not exhaustion

use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, ACCEPT_ENCODING};
use reqwest::{Client, Method, StatusCode};
use std::time::Duration;
use thiserror::Error;

use crate::hash::ContentHash;
use crate::observability::metrics;

/// Errors from a multi-endpoint fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("all endpoints exhausted")]
    Exhausted,

    #[error("all endpoints timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// HTTP basic auth credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Credentials are only used when a user name is set.
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        match username {
            Some(user) if !user.is_empty() => Some(Self {
                username: user.to_string(),
                password: password.unwrap_or_default().to_string(),
            }),
            _ => None,
        }
    }
}

/// Accepted response encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentEncoding {
    /// Negotiate gzip and decompress transparently.
    #[default]
    Gzip,
    /// Ask for an uncompressed body.
    Identity,
}

impl ContentEncoding {
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("identity") => ContentEncoding::Identity,
            _ => ContentEncoding::Gzip,
        }
    }
}

/// Request body variants understood by the KV stores.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Form(Vec<(String, String)>),
    Raw(Vec<u8>),
}

/// One logical request, replayed against each endpoint in turn.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    /// Appended to each endpoint URL as is.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    pub headers: Vec<(String, String)>,
    pub credentials: Option<Credentials>,
    pub timeout: Duration,
    pub encoding: ContentEncoding,
}

impl FetchRequest {
    pub fn new(method: Method, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            credentials: None,
            timeout,
            encoding: ContentEncoding::default(),
        }
    }

    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn encoding(mut self, encoding: ContentEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// The first definitive response of a fetch.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: StatusCode,
    pub body: Vec<u8>,
    pub headers: HeaderMap,
    pub hash: ContentHash,
    /// Endpoint that answered.
    pub endpoint: String,
}

/// Shared HTTP client that walks endpoint lists.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    /// Run `request` against `endpoints` in random order.
    pub async fn fetch(
        &self,
        endpoints: &[String],
        request: &FetchRequest,
    ) -> Result<FetchResult, FetchError> {
        if endpoints.is_empty() {
            return Err(FetchError::NoEndpoints);
        }

        let mut order = endpoints.to_vec();
        order.shuffle(&mut rand::thread_rng());

        let mut timeouts = 0usize;
        for endpoint in &order {
            let url = format!("{}{}", endpoint.trim_end_matches('/'), request.path);

            match self.attempt(&url, request).await {
                Ok(result) if result.status.is_server_error() => {
                    tracing::warn!(url = %url, status = %result.status, "Endpoint returned server error");
                    metrics::record_fetch_error(endpoint);
                }
                Ok(mut result) => {
                    result.endpoint = endpoint.clone();
                    return Ok(result);
                }
                Err(e) => {
                    if e.is_timeout() {
                        timeouts += 1;
                    }
                    tracing::warn!(url = %url, error = %e, "Endpoint request failed");
                    metrics::record_fetch_error(endpoint);
                }
            }
        }

        if timeouts == order.len() {
            Err(FetchError::Timeout(request.timeout))
        } else {
            Err(FetchError::Exhausted)
        }
    }

    async fn attempt(&self, url: &str, request: &FetchRequest) -> Result<FetchResult, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.encoding == ContentEncoding::Identity {
            builder = builder.header(ACCEPT_ENCODING, "identity");
        }
        if let Some(creds) = &request.credentials {
            builder = builder.basic_auth(&creds.username, Some(&creds.password));
        }
        builder = match &request.body {
            Some(RequestBody::Form(fields)) => builder.form(fields),
            Some(RequestBody::Raw(bytes)) => builder.body(bytes.clone()),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        let hash = ContentHash::of(&body);

        Ok(FetchResult {
            status,
            body,
            headers,
            hash,
            endpoint: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_need_a_user() {
        assert!(Credentials::from_parts(None, Some("pw")).is_none());
        assert!(Credentials::from_parts(Some(""), Some("pw")).is_none());
        let creds = Credentials::from_parts(Some("deploy"), None).unwrap();
        assert_eq!(creds.password, "");
    }

    #[test]
    fn test_encoding_defaults_to_gzip() {
        assert_eq!(ContentEncoding::parse(None), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::parse(Some("gzip")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::parse(Some("identity")), ContentEncoding::Identity);
    }

    #[tokio::test]
    async fn test_empty_endpoint_list() {
        let fetcher = Fetcher::new().unwrap();
        let request = FetchRequest::new(Method::GET, "/app", Duration::from_secs(1));
        let err = fetcher.fetch(&[], &request).await.unwrap_err();
        assert!(matches!(err, FetchError::NoEndpoints));
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_exhaust() {
        let fetcher = Fetcher::new().unwrap();
        let request = FetchRequest::new(Method::GET, "/app", Duration::from_secs(1));
        // port 9 (discard) on loopback is closed in test environments
        let endpoints = vec!["http://127.0.0.1:9".to_string()];
        let err = fetcher.fetch(&endpoints, &request).await.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted));
    }
}
