//! Configuration validation.
//!
//! Serde handles syntax; this pass checks semantics and returns every
//! error it finds, not just the first. Validation is a pure function of
//! the parsed config.

use regex::Regex;
use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{AgentConfig, GatewayConfig};

/// A single semantic problem in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: value is required")]
    Missing { field: String },

    #[error("{field}: must be greater than zero")]
    Zero { field: String },

    #[error("{field}: invalid regex '{pattern}': {reason}")]
    Regex {
        field: String,
        pattern: String,
        reason: String,
    },

    #[error("{field}: invalid value '{value}'")]
    Invalid { field: String, value: String },

    #[error("duplicate backend prefix /api/{version}/{id}/")]
    DuplicateBackend { version: String, id: String },
}

fn check_regex(field: String, pattern: &str, errors: &mut Vec<ValidationError>) {
    if let Err(e) = Regex::new(pattern) {
        errors.push(ValidationError::Regex {
            field,
            pattern: pattern.to_string(),
            reason: e.to_string(),
        });
    }
}

fn check_encoding(field: String, value: &Option<String>, errors: &mut Vec<ValidationError>) {
    if let Some(encoding) = value {
        if !matches!(encoding.as_str(), "" | "gzip" | "identity") {
            errors.push(ValidationError::Invalid {
                field,
                value: encoding.clone(),
            });
        }
    }
}

/// Validate an agent config.
pub fn validate_agent_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.global.interval_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "global.interval_secs".into(),
        });
    }
    if config.global.command_timeout_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "global.command_timeout_secs".into(),
        });
    }
    check_encoding(
        "global.content_encoding".into(),
        &config.global.content_encoding,
        &mut errors,
    );

    for (i, template) in config.templates.iter().enumerate() {
        if template.src.trim().is_empty() {
            errors.push(ValidationError::Missing {
                field: format!("templates[{i}].src"),
            });
        }
        if template.dest.trim().is_empty() {
            errors.push(ValidationError::Missing {
                field: format!("templates[{i}].dest"),
            });
        }
        if template.timeout_secs == Some(0) {
            errors.push(ValidationError::Zero {
                field: format!("templates[{i}].timeout_secs"),
            });
        }
        if template.interval_secs == Some(0) {
            errors.push(ValidationError::Zero {
                field: format!("templates[{i}].interval_secs"),
            });
        }
        check_encoding(
            format!("templates[{i}].content_encoding"),
            &template.content_encoding,
            &mut errors,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a gateway config.
pub fn validate_gateway_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let global = &config.global;

    if global.listen.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::Invalid {
            field: "global.listen".into(),
            value: global.listen.clone(),
        });
    }
    if global.cert_file.is_some() != global.cert_key.is_some() {
        errors.push(ValidationError::Missing {
            field: "global.cert_file/global.cert_key".into(),
        });
    }
    if global.request_timeout_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "global.request_timeout_secs".into(),
        });
    }
    if global.backend_timeout_secs == 0 {
        errors.push(ValidationError::Zero {
            field: "global.backend_timeout_secs".into(),
        });
    }
    if !global.audit_urls.is_empty() && global.audit_queue_size == 0 {
        errors.push(ValidationError::Zero {
            field: "global.audit_queue_size".into(),
        });
    }

    let mut prefixes = HashSet::new();
    for (i, backend) in config.backends.iter().enumerate() {
        let id = backend.id.trim_matches('/');
        if id.is_empty() {
            errors.push(ValidationError::Missing {
                field: format!("backends[{i}].id"),
            });
        } else if !prefixes.insert((backend.backend.api_version(), id.to_string())) {
            errors.push(ValidationError::DuplicateBackend {
                version: backend.backend.api_version().to_string(),
                id: id.to_string(),
            });
        }
        if backend.nodes.is_empty() {
            errors.push(ValidationError::Missing {
                field: format!("backends[{i}].nodes"),
            });
        }
        for node in &backend.nodes {
            if url::Url::parse(node).is_err() {
                errors.push(ValidationError::Invalid {
                    field: format!("backends[{i}].nodes"),
                    value: node.clone(),
                });
            }
        }
        for mask in &backend.read.keys {
            check_regex(format!("backends[{i}].read.keys"), mask, &mut errors);
        }
        for mask in &backend.write.keys {
            check_regex(format!("backends[{i}].write.keys"), mask, &mut errors);
        }

        for (j, check) in backend.checks.iter().enumerate() {
            if check.method.parse::<axum::http::Method>().is_err() || check.method.is_empty() {
                errors.push(ValidationError::Invalid {
                    field: format!("backends[{i}].checks[{j}].method"),
                    value: check.method.clone(),
                });
            }
            if let Some(path) = &check.path {
                check_regex(format!("backends[{i}].checks[{j}].path"), path, &mut errors);
            }
            if let Some(pattern) = &check.regexp {
                check_regex(format!("backends[{i}].checks[{j}].regexp"), pattern, &mut errors);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
