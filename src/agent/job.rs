//! Immutable job definitions.
//!
//! A [`Job`] is resolved from a `[[templates]]` entry plus the global block
//! once per config load. Tasks share it through an `Arc` and never mutate
//! it; a reload builds a fresh set.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{AgentGlobalConfig, TemplateConfig};
use crate::fetch::{ContentEncoding, Credentials};

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// One fetch-render-write-reload unit.
#[derive(Debug, Clone)]
pub struct Job {
    pub src: PathBuf,
    pub dest: PathBuf,
    /// Written first, promoted to `dest` after validation.
    pub staging: PathBuf,
    /// Key path appended to every endpoint.
    pub path: String,
    pub create: bool,
    pub endpoints: Vec<String>,
    pub encoding: ContentEncoding,
    pub credentials: Option<Credentials>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub interval: Duration,
    pub check_cmd: Option<String>,
    pub reload_cmd: Option<String>,
    pub command_timeout: Duration,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}

impl Job {
    /// Resolve a template entry against the global defaults.
    pub fn build(template: &TemplateConfig, global: &AgentGlobalConfig, interval: Duration) -> Self {
        let endpoints = if template.urls.is_empty() {
            global.urls.clone()
        } else {
            template.urls.clone()
        };

        let encoding = template
            .content_encoding
            .as_deref()
            .filter(|e| !e.is_empty())
            .or(global.content_encoding.as_deref());

        let staging = non_empty(&template.temp).unwrap_or_else(|| template.dest.clone());

        Self {
            src: PathBuf::from(&template.src),
            dest: PathBuf::from(&template.dest),
            staging: PathBuf::from(staging),
            path: template.path.clone(),
            create: template.create,
            endpoints,
            encoding: ContentEncoding::parse(encoding),
            credentials: Credentials::from_parts(
                template.username.as_deref(),
                template.password.as_deref(),
            ),
            headers: template
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            timeout: template
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT),
            interval: template
                .interval_secs
                .map(Duration::from_secs)
                .unwrap_or(interval),
            check_cmd: non_empty(&template.check_cmd),
            reload_cmd: non_empty(&template.reload_cmd),
            command_timeout: Duration::from_secs(global.command_timeout_secs),
        }
    }

    /// Stable identity used to key per-job state.
    pub fn id(&self) -> String {
        format!("{}->{}", self.src.display(), self.dest.display())
    }

    pub fn stages_in_place(&self) -> bool {
        self.staging == self.dest
    }
}
