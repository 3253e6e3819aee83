//! HTTP endpoint for trying templates against a sample document.
//!
//! `POST /templates/{name}` renders `{templates_dir}/{name}` with the JSON
//! request body and reports whether it worked.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::render::{render_file, TemplateRenderer};

#[derive(Clone)]
struct CheckState {
    templates_dir: PathBuf,
    renderer: Arc<dyn TemplateRenderer>,
}

#[derive(Debug, Serialize)]
struct CheckResponse {
    status: &'static str,
}

pub fn router(templates_dir: PathBuf, renderer: Arc<dyn TemplateRenderer>) -> Router {
    Router::new()
        .route("/templates/{name}", post(check_template))
        .with_state(CheckState {
            templates_dir,
            renderer,
        })
}

async fn check_template(
    State(state): State<CheckState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return (StatusCode::BAD_REQUEST, "invalid template name").into_response();
    }

    let document: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "Parsing JSON body failed");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let path = state.templates_dir.join(&name);
    match render_file(state.renderer.as_ref(), &path, &document).await {
        Ok(_) => (StatusCode::OK, Json(CheckResponse { status: "success" })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Generating config file failed");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::render::HandlebarsRenderer;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(dir: &tempfile::TempDir) -> Router {
        std::fs::write(dir.path().join("app.hbs"), "host={{host}}").unwrap();
        std::fs::write(dir.path().join("broken.hbs"), "{{#each}}").unwrap();
        router(dir.path().to_path_buf(), Arc::new(HandlebarsRenderer::new()))
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_template() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir).oneshot(post("/templates/app.hbs", r#"{"host":"db1"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], br#"{"status":"success"}"#);
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir).oneshot(post("/templates/app.hbs", "{")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_and_broken_templates() {
        let dir = tempfile::tempdir().unwrap();
        let missing = app(&dir).oneshot(post("/templates/none.hbs", "{}")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let broken = app(&dir).oneshot(post("/templates/broken.hbs", "{}")).await.unwrap();
        assert_eq!(broken.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir).oneshot(post("/templates/..%2Fsecret", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
