//! Per-backend policy checks.
//!
//! # Evaluation
//! ```text
//! checks (configured order)
//!     → skip until method matches and path regex matches (or is unset)
//!     → first match governs:
//!         users set     → valid basic auth for a listed user, else 403
//!         PUT           → dir constraint, else 400
//!                       → value regex (dir name for directories), else 400
//!                       → JSON schema, else 400 with the first error
//!     → no match → allow
//! ```

use axum::http::{Method, StatusCode};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{CheckConfig, DirConstraint};
use crate::security::auth::BasicAuth;

/// Errors compiling a backend's policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("check {index}: invalid method '{method}'")]
    Method { index: usize, method: String },

    #[error("check {index}: invalid regex '{pattern}': {source}")]
    Regex {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid key mask '{pattern}': {source}")]
    Mask {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("check {index}: cannot read schema {path}: {source}")]
    SchemaRead {
        index: usize,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("check {index}: invalid schema {path}: {message}")]
    Schema {
        index: usize,
        path: String,
        message: String,
    },
}

/// A structured policy denial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    pub status: StatusCode,
    pub message: String,
}

impl Denial {
    pub fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: "Access is denied".to_string(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

/// Form parameters of a mutating request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteParams {
    pub dir: bool,
    pub value: String,
}

struct CompiledCheck {
    method: Method,
    path: Option<Regex>,
    users: Vec<String>,
    dir: Option<DirConstraint>,
    regexp: Option<Regex>,
    schema: Option<jsonschema::Validator>,
}

fn compile_regex(index: usize, pattern: &Option<String>) -> Result<Option<Regex>, PolicyError> {
    match pattern.as_deref().filter(|p| !p.is_empty()) {
        Some(p) => Regex::new(p).map(Some).map_err(|source| PolicyError::Regex {
            index,
            pattern: p.to_string(),
            source,
        }),
        None => Ok(None),
    }
}

fn load_schema(index: usize, reference: &str) -> Result<jsonschema::Validator, PolicyError> {
    let path = reference.strip_prefix("file://").unwrap_or(reference);
    let text = std::fs::read_to_string(path).map_err(|source| PolicyError::SchemaRead {
        index,
        path: path.to_string(),
        source,
    })?;
    let schema: Value = serde_json::from_str(&text).map_err(|e| PolicyError::Schema {
        index,
        path: path.to_string(),
        message: e.to_string(),
    })?;
    jsonschema::options()
        .build(&schema)
        .map_err(|e| PolicyError::Schema {
            index,
            path: path.to_string(),
            message: e.to_string(),
        })
}

impl CompiledCheck {
    fn compile(index: usize, config: &CheckConfig) -> Result<Self, PolicyError> {
        let method = Method::from_bytes(config.method.to_ascii_uppercase().as_bytes()).map_err(|_| {
            PolicyError::Method {
                index,
                method: config.method.clone(),
            }
        })?;

        let schema = match config.schema.as_deref().filter(|s| !s.is_empty()) {
            Some(reference) => Some(load_schema(index, reference)?),
            None => None,
        };

        Ok(Self {
            method,
            path: compile_regex(index, &config.path)?,
            users: config.users.clone(),
            dir: config.dir,
            regexp: compile_regex(index, &config.regexp)?,
            schema,
        })
    }

    fn applies(&self, method: &Method, key: &str) -> bool {
        self.method == *method && self.path.as_ref().map_or(true, |re| re.is_match(key))
    }
}

fn leaf_name(key: &str) -> &str {
    key.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

/// Compiled checks of one backend.
pub struct PolicyEngine {
    checks: Vec<CompiledCheck>,
    users: Arc<BTreeMap<String, String>>,
}

impl PolicyEngine {
    /// Compile `checks`; `users` is the gateway's user directory.
    pub fn compile(checks: &[CheckConfig], users: Arc<BTreeMap<String, String>>) -> Result<Self, PolicyError> {
        let checks = checks
            .iter()
            .enumerate()
            .map(|(i, c)| CompiledCheck::compile(i, c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { checks, users })
    }

    /// Allow or deny a request for `key`.
    pub fn authorize(
        &self,
        method: &Method,
        key: &str,
        auth: Option<&BasicAuth>,
        write: Option<&WriteParams>,
    ) -> Result<(), Denial> {
        let Some(check) = self.checks.iter().find(|c| c.applies(method, key)) else {
            tracing::debug!(method = %method, key = %key, "No policy check matched, allowing");
            return Ok(());
        };

        if !check.users.is_empty() && !self.user_allowed(check, auth) {
            return Err(Denial::forbidden());
        }

        if *method != Method::PUT {
            return Ok(());
        }
        let params = write.cloned().unwrap_or_default();

        match check.dir {
            Some(DirConstraint::Directory) if !params.dir => {
                return Err(Denial::bad_request("Invalid parameter type: Directory expected"));
            }
            Some(DirConstraint::Value) if params.dir => {
                return Err(Denial::bad_request("Invalid parameter type: Not directory expected"));
            }
            _ => {}
        }

        if let Some(re) = &check.regexp {
            if params.dir && !re.is_match(leaf_name(key)) {
                return Err(Denial::bad_request("Invalid parameter name"));
            }
            if !params.dir && !re.is_match(&params.value) {
                return Err(Denial::bad_request("Invalid parameter value"));
            }
        }

        if let Some(schema) = &check.schema {
            let document: Value = serde_json::from_str(&params.value)
                .map_err(|e| Denial::bad_request(e.to_string()))?;
            if let Err(error) = schema.validate(&document) {
                return Err(Denial::bad_request(error.to_string()));
            }
        }

        Ok(())
    }

    fn user_allowed(&self, check: &CompiledCheck, auth: Option<&BasicAuth>) -> bool {
        let Some(auth) = auth else {
            return false;
        };
        let known = self
            .users
            .get(&auth.user)
            .is_some_and(|password| *password == auth.password);
        known && check.users.iter().any(|u| *u == auth.user)
    }
}

/// Which credentials/masks a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    pub fn of(method: &Method) -> Self {
        if *method == Method::GET || *method == Method::HEAD {
            AccessKind::Read
        } else {
            AccessKind::Write
        }
    }
}

/// Regex allow-lists on key paths per access kind.
#[derive(Debug, Clone, Default)]
pub struct KeyMasks {
    read: Vec<Regex>,
    write: Vec<Regex>,
}

impl KeyMasks {
    pub fn compile(read: &[String], write: &[String]) -> Result<Self, PolicyError> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|source| PolicyError::Mask {
                        pattern: p.clone(),
                        source,
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            read: compile(read)?,
            write: compile(write)?,
        })
    }

    /// An empty list allows every key.
    pub fn allows(&self, kind: AccessKind, key: &str) -> bool {
        let masks = match kind {
            AccessKind::Read => &self.read,
            AccessKind::Write => &self.write,
        };
        masks.is_empty() || masks.iter().any(|re| re.is_match(key))
    }
}
