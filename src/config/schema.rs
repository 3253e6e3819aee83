//! Configuration schema definitions.
//!
//! Two roots live here: [`AgentConfig`] for `cdagent` and [`GatewayConfig`]
//! for `cdserver`. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the templating agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Defaults shared by every template job.
    pub global: AgentGlobalConfig,

    /// Template jobs, one per rendered destination file.
    pub templates: Vec<TemplateConfig>,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// How the agent schedules its jobs.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleMode {
    /// All jobs run together once per tick.
    #[default]
    Interval,
    /// Every job loops on its own interval.
    Continuous,
}

/// Global defaults block of the agent config.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentGlobalConfig {
    /// Endpoint URLs used by jobs that don't list their own.
    pub urls: Vec<String>,

    /// Content-encoding hint (`gzip` or `identity`).
    pub content_encoding: Option<String>,

    /// Optional TOML file of document checks applied before rendering.
    pub checks_file: Option<String>,

    /// Directory served by the template check endpoint.
    pub templates_dir: String,

    /// Tick length in interval mode, and the default per-job interval.
    pub interval_secs: u64,

    /// Scheduling mode.
    pub mode: ScheduleMode,

    /// Timeout for validate and reload commands.
    pub command_timeout_secs: u64,
}

impl Default for AgentGlobalConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            content_encoding: None,
            checks_file: None,
            templates_dir: ".".to_string(),
            interval_secs: 30,
            mode: ScheduleMode::Interval,
            command_timeout_secs: 10,
        }
    }
}

/// A single template job.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TemplateConfig {
    /// Endpoint URLs overriding `global.urls`.
    pub urls: Vec<String>,

    /// Key path appended to every endpoint URL.
    pub path: String,

    /// Create the key path as a directory when the store answers 404.
    pub create: bool,

    /// Template file.
    pub src: String,

    /// Staging path; defaults to `dest`.
    pub temp: Option<String>,

    /// Destination file.
    pub dest: String,

    /// Validation command run against the staged file.
    pub check_cmd: Option<String>,

    /// Reload command run after promotion.
    pub reload_cmd: Option<String>,

    /// Fetch timeout per endpoint (default 5s).
    pub timeout_secs: Option<u64>,

    /// Loop interval in continuous mode (default `global.interval_secs`).
    pub interval_secs: Option<u64>,

    /// Content-encoding hint overriding the global one.
    pub content_encoding: Option<String>,

    /// Extra request headers.
    pub headers: BTreeMap<String, String>,

    /// HTTP basic auth user.
    pub username: Option<String>,

    /// HTTP basic auth password.
    pub password: Option<String>,
}

/// A check applied to the fetched document before rendering.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentCheckConfig {
    /// Dotted path into the document, e.g. `upstream.host`.
    pub key: String,

    /// Regex the value at `key` must match.
    pub value: String,
}

/// Contents of `global.checks_file`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ChecksFile {
    pub checks: Vec<DocumentCheckConfig>,
}

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener, TLS and user directory.
    pub global: GatewayGlobalConfig,

    /// Exposed KV backends.
    pub backends: Vec<BackendConfig>,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Global block of the gateway config.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayGlobalConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub listen: String,

    /// Path to certificate file (PEM).
    pub cert_file: Option<String>,

    /// Path to private key file (PEM).
    pub cert_key: Option<String>,

    /// User directory for basic auth: user name → password.
    pub users: BTreeMap<String, String>,

    /// Total time allowed per inbound request.
    pub request_timeout_secs: u64,

    /// Timeout for each call to a KV endpoint.
    pub backend_timeout_secs: u64,

    /// Collectors receiving audit batches.
    pub audit_urls: Vec<String>,

    /// Capacity of the audit queue.
    pub audit_queue_size: usize,

    /// Seconds between audit flushes.
    pub audit_flush_secs: u64,
}

impl Default for GatewayGlobalConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            cert_file: None,
            cert_key: None,
            users: BTreeMap::new(),
            request_timeout_secs: 30,
            backend_timeout_secs: 5,
            audit_urls: Vec::new(),
            audit_queue_size: 1024,
            audit_flush_secs: 5,
        }
    }
}

/// Kind of KV store behind a backend.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// etcd v2 keys API, mounted at `/api/v2/{id}/`.
    Etcd,
    /// Consul KV API, mounted at `/api/v1/{id}/`.
    Consul,
}

impl BackendKind {
    /// API version segment of the gateway prefix.
    pub fn api_version(&self) -> &'static str {
        match self {
            BackendKind::Etcd => "v2",
            BackendKind::Consul => "v1",
        }
    }
}

/// Credentials plus key masks for one access kind.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessConfig {
    pub username: Option<String>,
    pub password: Option<String>,

    /// Regex allow-list on key paths; empty allows everything.
    pub keys: Vec<String>,
}

/// A configured KV backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Store kind.
    pub backend: BackendKind,

    /// Identifier used as URL path prefix.
    pub id: String,

    /// KV endpoint URLs.
    pub nodes: Vec<String>,

    /// Credentials and masks for GET.
    #[serde(default)]
    pub read: AccessConfig,

    /// Credentials and masks for PUT and DELETE.
    #[serde(default)]
    pub write: AccessConfig,

    /// Ordered policy checks.
    #[serde(default)]
    pub checks: Vec<CheckConfig>,

    /// Cache flattened GET responses.
    #[serde(default)]
    pub cache: bool,

    /// Lifetime of cached responses.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl() -> u64 {
    10
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Etcd,
            id: String::new(),
            nodes: Vec::new(),
            read: AccessConfig::default(),
            write: AccessConfig::default(),
            checks: Vec::new(),
            cache: false,
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

/// Directory constraint of a check.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DirConstraint {
    /// Only directory writes are accepted.
    Directory,
    /// Only value writes are accepted.
    Value,
}

/// A policy rule gating one method (and optionally a path pattern).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckConfig {
    /// HTTP method the rule applies to.
    pub method: String,

    /// Regex on the key path.
    #[serde(default)]
    pub path: Option<String>,

    /// Users allowed through; empty disables the user check.
    #[serde(default)]
    pub users: Vec<String>,

    /// Directory/value constraint on writes.
    #[serde(default)]
    pub dir: Option<DirConstraint>,

    /// Regex the written value (or directory name) must match.
    #[serde(default)]
    pub regexp: Option<String>,

    /// JSON schema file the written value must satisfy.
    #[serde(default)]
    pub schema: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// `pretty` or `compact`.
    pub log_format: String,

    /// Enable the metrics recorder.
    pub metrics_enabled: bool,

    /// Standalone exporter address; the gateway also serves `/metrics`.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "compact".to_string(),
            metrics_enabled: true,
            metrics_address: None,
        }
    }
}
