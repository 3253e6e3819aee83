//! HTTP server setup for the gateway.
//!
//! # Responsibilities
//! - Create the Axum router: `/health`, `/metrics`, backend dispatch
//! - Wire up middleware (tracing, timeout, request ID)
//! - Serve plain HTTP or TLS until shutdown

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use axum_server::tls_rustls::RustlsConfig;

use crate::gateway::{BackendRequest, Gateway};
use crate::http::request::{canonical_key, X_REQUEST_ID};
use crate::http::response::GatewayError;
use crate::lifecycle::Shutdown;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
const TLS_DRAIN: Duration = Duration::from_secs(10);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub metrics: Option<PrometheusHandle>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(gateway: Arc<Gateway>, metrics: Option<PrometheusHandle>, request_timeout: Duration) -> Self {
        let state = AppState { gateway, metrics };
        Self {
            router: Self::build_router(state, request_timeout),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .fallback(gateway_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The router, for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve plain HTTP until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut stop = shutdown.subscribe();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS on `addr` until `shutdown` fires.
    pub async fn run_tls(self, addr: SocketAddr, tls: RustlsConfig, shutdown: Shutdown) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let mut stop = shutdown.subscribe();
        let drain = handle.clone();
        tokio::spawn(async move {
            let _ = stop.recv().await;
            tracing::info!("Shutdown signal received");
            drain.graceful_shutdown(Some(TLS_DRAIN));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

/// Dispatch `/api/{version}/{id}/...` to its backend.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let Some(route) = state.gateway.route(&path) else {
        tracing::warn!(request_id = %request_id, path = %path, "No backend matched");
        return GatewayError::KeyNotFound {
            message: "No backend for path".to_string(),
            cause: path,
        }
        .into_response();
    };

    // Masks, checks and the store all see this key and nothing else.
    let key = match canonical_key(&route.key) {
        Ok(key) => key,
        Err(message) => {
            tracing::warn!(request_id = %request_id, path = %path, error = %message, "Rejected key path");
            return GatewayError::bad_request(message, &route.key).into_response();
        }
    };

    tracing::debug!(
        request_id = %request_id,
        backend = %route.target.name(),
        method = %request.method(),
        key = %key,
        "Dispatching request"
    );

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return GatewayError::bad_request(format!("Cannot read request body: {e}"), &key).into_response();
        }
    };

    route
        .target
        .handle(BackendRequest {
            method: parts.method,
            key,
            query: parts.uri.query().map(String::from),
            headers: parts.headers,
            body,
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        HttpServer::new(Arc::new(Gateway::new()), None, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_health() {
        let response = server()
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_unknown_prefix_is_404() {
        let response = server()
            .router()
            .oneshot(Request::get("/api/v2/nope/key").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
