//! Gateway error responses.
//!
//! # Responsibilities
//! - Map policy, store and request failures to HTTP status codes
//! - Render the JSON error body `{errorCode, message, cause}`
//!
//! # Design Decisions
//! - `cause` always carries the key path the request targeted
//! - Store 4xx answers pass through; everything else upstream is 502

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::gateway::kv::KvError;
use crate::security::Denial;

/// A failed gateway request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{message}")]
    PolicyDenied {
        status: StatusCode,
        message: String,
        cause: String,
    },

    #[error("{message}")]
    BackendUnavailable { message: String, cause: String },

    #[error("{message}")]
    KeyNotFound { message: String, cause: String },

    #[error("{message}")]
    BadRequest {
        status: StatusCode,
        message: String,
        cause: String,
    },

    #[error("{message}")]
    Internal { message: String, cause: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error_code: u16,
    message: &'a str,
    cause: &'a str,
}

impl GatewayError {
    pub fn denied(denial: Denial, key: &str) -> Self {
        GatewayError::PolicyDenied {
            status: denial.status,
            message: denial.message,
            cause: key.to_string(),
        }
    }

    pub fn method_not_allowed(key: &str) -> Self {
        GatewayError::BadRequest {
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: "Method not allowed".to_string(),
            cause: key.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>, key: &str) -> Self {
        GatewayError::BadRequest {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            cause: key.to_string(),
        }
    }

    /// Map a store failure for `key`.
    pub fn from_kv(error: KvError, key: &str) -> Self {
        let cause = key.to_string();
        match error {
            KvError::NotFound(message) => GatewayError::KeyNotFound { message, cause },
            KvError::Rejected { status, message } if (400..500).contains(&status) => GatewayError::BadRequest {
                status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST),
                message,
                cause,
            },
            other => GatewayError::BackendUnavailable {
                message: other.to_string(),
                cause,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::PolicyDenied { status, .. } | GatewayError::BadRequest { status, .. } => *status,
            GatewayError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::KeyNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn cause(&self) -> &str {
        match self {
            GatewayError::PolicyDenied { cause, .. }
            | GatewayError::BackendUnavailable { cause, .. }
            | GatewayError::KeyNotFound { cause, .. }
            | GatewayError::BadRequest { cause, .. }
            | GatewayError::Internal { cause, .. } => cause,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let body = ErrorBody {
            error_code: status.as_u16(),
            message: &message,
            cause: self.cause(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;

    #[test]
    fn test_kv_error_mapping() {
        let not_found = GatewayError::from_kv(KvError::NotFound("100: Key not found (/app)".into()), "/app");
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let down = GatewayError::from_kv(KvError::Unavailable(FetchError::Exhausted), "/app");
        assert_eq!(down.status(), StatusCode::BAD_GATEWAY);

        let rejected = GatewayError::from_kv(KvError::Rejected { status: 412, message: "compare failed".into() }, "/app");
        assert_eq!(rejected.status(), StatusCode::PRECONDITION_FAILED);

        let upstream = GatewayError::from_kv(KvError::Rejected { status: 500, message: "boom".into() }, "/app");
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = GatewayError::bad_request("Invalid parameter value", "/app/flag").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errorCode"], 400);
        assert_eq!(body["message"], "Invalid parameter value");
        assert_eq!(body["cause"], "/app/flag");
    }
}
