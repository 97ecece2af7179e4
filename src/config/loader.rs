//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::directive::{parse_directive, DirectiveError};
use crate::config::placeholders::Replacer;
use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::config::visits::VisitsConfigError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("{}: {source}", .path.display())]
    Directive {
        path: PathBuf,
        #[source]
        source: DirectiveError,
    },

    #[error("darkvisitors: {0}")]
    Visits(#[from] VisitsConfigError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// The visit reporter settings, from either the inline table or the block
/// file, come back provisioned: defaults applied and placeholders expanded.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    load_config_with(path, &Replacer::new())
}

pub fn load_config_with(path: &Path, replacer: &Replacer) -> Result<ProxyConfig, ConfigError> {
    let content = read(path)?;
    let mut config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    if let Some(file) = visits_file_path(path, &config) {
        let block = read(&file)?;
        let visits = parse_directive(&block).map_err(|source| ConfigError::Directive {
            path: file.clone(),
            source,
        })?;
        config.darkvisitors = Some(visits);
    }

    config.darkvisitors = config
        .darkvisitors
        .take()
        .map(|visits| visits.provision(replacer))
        .transpose()?;

    Ok(config)
}

/// Where `config.darkvisitors_file` points, resolved against the directory
/// of the config file at `config_path`.
pub fn visits_file_path(config_path: &Path, config: &ProxyConfig) -> Option<PathBuf> {
    let file = config.darkvisitors_file.as_ref()?;
    match config_path.parent() {
        Some(dir) if file.is_relative() => Some(dir.join(file)),
        _ => Some(file.clone()),
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}
