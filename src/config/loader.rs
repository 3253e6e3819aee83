//! Configuration loading from disk.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::{AgentConfig, ChecksFile, GatewayConfig};
use crate::config::validation::{validate_agent_config, validate_gateway_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate the agent configuration.
pub fn load_agent_config(path: &Path) -> Result<AgentConfig, ConfigError> {
    let config: AgentConfig = read_toml(path)?;
    validate_agent_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate the gateway configuration.
pub fn load_gateway_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = read_toml(path)?;
    validate_gateway_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load the document checks referenced by `global.checks_file`.
pub fn load_checks_file(path: &Path) -> Result<ChecksFile, ConfigError> {
    read_toml(path)
}
