//! Request handling for one backend.
//!
//! # Flow
//! ```text
//! request → method other than GET/PUT/DELETE (405)
//!         → key masks (403) → policy checks (400/403)
//!         → GET:        cache? → store.get → raw | flatten → hash compare (204)
//!         → PUT:        store.set → echo store answer, clear cache
//!         → DELETE:     store.delete → echo store answer, clear cache
//!         → otherwise:  405
//! every answer → metrics + audit record
//! ```

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{BackendConfig, BackendKind};
use crate::fetch::{Credentials, Fetcher};
use crate::gateway::audit::{Action, AuditQueue};
use crate::gateway::cache::ResponseCache;
use crate::gateway::flatten::flatten_listing;
use crate::gateway::kv::{ConsulStore, EtcdStore, GetOptions, KvStore, StoreEndpoint};
use crate::hash::ContentHash;
use crate::http::request::{parse_write_params, query_flag, X_CUSTOM_FORMAT, X_CUSTOM_HASH};
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::security::{AccessKind, BasicAuth, Denial, KeyMasks, PolicyEngine, PolicyError, WriteParams};

/// A request already stripped of its backend prefix.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    /// Key path with a leading slash.
    pub key: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Everything needed to serve one configured backend.
pub struct BackendHandler {
    name: String,
    store: Arc<dyn KvStore>,
    policy: PolicyEngine,
    masks: KeyMasks,
    cache: Option<ResponseCache>,
    audit: Option<AuditQueue>,
}

impl BackendHandler {
    pub fn new(name: impl Into<String>, store: Arc<dyn KvStore>, policy: PolicyEngine, masks: KeyMasks) -> Self {
        Self {
            name: name.into(),
            store,
            policy,
            masks,
            cache: None,
            audit: None,
        }
    }

    /// Build the store client and policy of a configured backend.
    pub fn from_config(
        config: &BackendConfig,
        users: Arc<BTreeMap<String, String>>,
        fetcher: Fetcher,
        timeout: Duration,
    ) -> Result<Self, PolicyError> {
        let endpoint = StoreEndpoint {
            nodes: config.nodes.clone(),
            read: Credentials::from_parts(config.read.username.as_deref(), config.read.password.as_deref()),
            write: Credentials::from_parts(config.write.username.as_deref(), config.write.password.as_deref()),
            timeout,
        };
        let store: Arc<dyn KvStore> = match config.backend {
            BackendKind::Etcd => Arc::new(EtcdStore::new(fetcher, endpoint)),
            BackendKind::Consul => Arc::new(ConsulStore::new(fetcher, endpoint)),
        };

        let policy = PolicyEngine::compile(&config.checks, users)?;
        let masks = KeyMasks::compile(&config.read.keys, &config.write.keys)?;
        let name = format!("{}/{}", config.backend.api_version(), config.id.trim_matches('/'));

        let mut handler = Self::new(name, store, policy, masks);
        if config.cache {
            handler = handler.with_cache(Duration::from_secs(config.cache_ttl_secs));
        }
        Ok(handler)
    }

    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(ResponseCache::new(ttl));
        self
    }

    pub fn with_audit(mut self, audit: AuditQueue) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Label used in logs and metrics, e.g. `v2/etcd01`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn handle(&self, request: BackendRequest) -> Response {
        let start = Instant::now();
        let auth = BasicAuth::from_headers(&request.headers);

        let (response, error) = match self.dispatch(&request, auth.as_ref()).await {
            Ok(response) => (response, None),
            Err(e) => {
                tracing::warn!(backend = %self.name, key = %request.key, status = %e.status(), error = %e, "Request failed");
                let message = e.to_string();
                (e.into_response(), Some(message))
            }
        };

        let status = response.status().as_u16();
        metrics::record_request(&self.name, request.method.as_str(), status, start);

        if let Some(audit) = &self.audit {
            let mut action = Action::new(auth.as_ref().map(|a| a.user.as_str()), request.method.as_str(), &request.key)
                .attribute("backend", &self.name)
                .attribute("code", status);
            if let Some(message) = error {
                action = action.describe(message);
            }
            audit.push(action);
        }
        response
    }

    async fn dispatch(&self, request: &BackendRequest, auth: Option<&BasicAuth>) -> Result<Response, GatewayError> {
        let key = request.key.as_str();
        if !matches!(request.method, Method::GET | Method::PUT | Method::DELETE) {
            return Err(GatewayError::method_not_allowed(key));
        }
        let write = (request.method == Method::PUT).then(|| parse_write_params(&request.body));

        if !self.masks.allows(AccessKind::of(&request.method), key) {
            metrics::record_policy_denied(&self.name, StatusCode::FORBIDDEN.as_u16());
            return Err(GatewayError::denied(Denial::forbidden(), key));
        }

        self.policy
            .authorize(&request.method, key, auth, write.as_ref())
            .map_err(|denial| {
                metrics::record_policy_denied(&self.name, denial.status.as_u16());
                GatewayError::denied(denial, key)
            })?;

        match (&request.method, write) {
            (&Method::GET, _) => self.get(request).await,
            (&Method::PUT, Some(params)) => self.set(key, params).await,
            (&Method::DELETE, _) => self.delete(request).await,
            _ => Err(GatewayError::method_not_allowed(key)),
        }
    }

    async fn get(&self, request: &BackendRequest) -> Result<Response, GatewayError> {
        let key = request.key.as_str();
        let raw_format = request
            .headers
            .get(X_CUSTOM_FORMAT)
            .is_some_and(|v| v.as_bytes() == b"base");

        let cache_key = ResponseCache::key(key, request.query.as_deref());
        if !raw_format {
            if let Some(body) = self.cache.as_ref().and_then(|c| c.get(&cache_key)) {
                tracing::debug!(backend = %self.name, key = %key, "Serving cached listing");
                return Ok(hashed_response(&request.headers, body.to_vec()));
            }
        }

        let generation = self.cache.as_ref().map(ResponseCache::generation);
        let options = GetOptions {
            recursive: query_flag(request.query.as_deref(), "recursive"),
            sorted: query_flag(request.query.as_deref(), "sorted"),
        };
        let listing = self
            .store
            .get(key, options)
            .await
            .map_err(|e| GatewayError::from_kv(e, key))?;

        if raw_format {
            return Ok(json_response(StatusCode::OK, listing.raw));
        }

        let body = serde_json::to_vec(&flatten_listing(&listing.root)).map_err(|e| GatewayError::Internal {
            message: e.to_string(),
            cause: key.to_string(),
        })?;
        if let (Some(cache), Some(generation)) = (&self.cache, generation) {
            cache.put(cache_key, body.clone(), generation);
        }
        Ok(hashed_response(&request.headers, body))
    }

    async fn set(&self, key: &str, params: WriteParams) -> Result<Response, GatewayError> {
        let answer = self
            .store
            .set(key, &params.value, params.dir)
            .await
            .map_err(|e| GatewayError::from_kv(e, key))?;
        self.invalidate();
        tracing::info!(backend = %self.name, key = %key, dir = params.dir, "Key written");
        Ok(json_response(StatusCode::OK, answer))
    }

    async fn delete(&self, request: &BackendRequest) -> Result<Response, GatewayError> {
        let key = request.key.as_str();
        let recursive = query_flag(request.query.as_deref(), "recursive");
        let answer = self
            .store
            .delete(key, recursive)
            .await
            .map_err(|e| GatewayError::from_kv(e, key))?;
        self.invalidate();
        tracing::info!(backend = %self.name, key = %key, recursive, "Key deleted");
        Ok(json_response(StatusCode::OK, answer))
    }

    fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], Body::from(body)).into_response()
}

/// 204 when the client already holds this body, 200 otherwise. Both carry
/// the body hash.
fn hashed_response(request_headers: &HeaderMap, body: Vec<u8>) -> Response {
    let hash = ContentHash::of(&body);
    let unchanged = request_headers
        .get(X_CUSTOM_HASH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|seen| seen == hash.as_str());

    let mut response = if unchanged {
        StatusCode::NO_CONTENT.into_response()
    } else {
        json_response(StatusCode::OK, body)
    };
    if let Ok(value) = HeaderValue::from_str(hash.as_str()) {
        response.headers_mut().insert(X_CUSTOM_HASH, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashed_response_honours_seen_hash() {
        let body = br#"{"flag":true}"#.to_vec();
        let hash = ContentHash::of(&body);

        let fresh = hashed_response(&HeaderMap::new(), body.clone());
        assert_eq!(fresh.status(), StatusCode::OK);
        assert_eq!(fresh.headers()[X_CUSTOM_HASH], hash.as_str());

        let mut headers = HeaderMap::new();
        headers.insert(X_CUSTOM_HASH, HeaderValue::from_str(hash.as_str()).unwrap());
        let same = hashed_response(&headers, body);
        assert_eq!(same.status(), StatusCode::NO_CONTENT);
    }
}
