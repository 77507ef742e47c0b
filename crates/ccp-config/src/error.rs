//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::validate::ValidationError;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("environment variable {var}={value:?} is invalid: {reason}")]
    InvalidEnv {
        var: String,
        value: String,
        reason: String,
    },

    #[error("configuration invalid: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error("failed to serialize configuration: {0}")]
    Serialize(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<ConfigError> for ccp_common::Error {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid(_) | ConfigError::InvalidEnv { .. } => {
                ccp_common::Error::InvalidConfig(err.to_string())
            }
            other => ccp_common::Error::Config(other.to_string()),
        }
    }
}
