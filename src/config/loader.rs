//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::KernelConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
///
/// Keys a `[sources.<name>]` section leaves out are taken from `[defaults]`.
pub fn parse_config(content: &str) -> Result<KernelConfig, ConfigError> {
    let mut table: toml::Table = content.parse()?;
    inherit_defaults(&mut table);
    let config: KernelConfig = toml::Value::Table(table).try_into()?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn inherit_defaults(table: &mut toml::Table) {
    let Some(toml::Value::Table(defaults)) = table.get("defaults").cloned() else {
        return;
    };
    let Some(toml::Value::Table(sources)) = table.get_mut("sources") else {
        return;
    };
    for (_, source) in sources.iter_mut() {
        if let toml::Value::Table(source) = source {
            for (key, value) in &defaults {
                source.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<KernelConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
