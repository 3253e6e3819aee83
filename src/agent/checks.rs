//! Document checks applied before rendering.
//!
//! Each check names a dotted path into the fetched JSON and a regex the
//! value there must match. A path absent from the document is not checked.

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::config::schema::ChecksFile;
use crate::config::validation::ValidationError;

#[derive(Debug, Error)]
#[error("document check failed: '{key}' = '{value}' does not match '{pattern}'")]
pub struct CheckFailure {
    pub key: String,
    pub value: String,
    pub pattern: String,
}

#[derive(Debug, Clone)]
pub struct DocumentCheck {
    key: String,
    pattern: Regex,
}

impl DocumentCheck {
    pub fn new(key: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            key: key.to_string(),
            pattern: Regex::new(pattern)?,
        })
    }

    fn lookup<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        self.key
            .split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(document, |node, segment| match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    pub fn verify(&self, document: &Value) -> Result<(), CheckFailure> {
        let Some(found) = self.lookup(document) else {
            return Ok(());
        };
        let value = match found {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if self.pattern.is_match(&value) {
            Ok(())
        } else {
            Err(CheckFailure {
                key: self.key.clone(),
                value,
                pattern: self.pattern.as_str().to_string(),
            })
        }
    }
}

/// Compile every check, collecting all bad patterns.
pub fn compile_checks(file: &ChecksFile) -> Result<Vec<DocumentCheck>, Vec<ValidationError>> {
    let mut checks = Vec::with_capacity(file.checks.len());
    let mut errors = Vec::new();

    for (i, check) in file.checks.iter().enumerate() {
        match DocumentCheck::new(&check.key, &check.value) {
            Ok(compiled) => checks.push(compiled),
            Err(e) => errors.push(ValidationError::Regex {
                field: format!("checks[{i}].value"),
                pattern: check.value.clone(),
                reason: e.to_string(),
            }),
        }
    }

    if errors.is_empty() {
        Ok(checks)
    } else {
        Err(errors)
    }
}

/// Run every check; the first failure is returned.
pub fn verify_document(checks: &[DocumentCheck], document: &Value) -> Result<(), CheckFailure> {
    checks.iter().try_for_each(|check| check.verify(document))
}
