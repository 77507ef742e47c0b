//! Configuration resolution.
//!
//! Precedence, lowest to highest: built-in defaults, config file, environment
//! variables. CLI flags are applied by the caller on the returned config.
//!
//! The config file is the first of:
//! 1. an explicit path (`--config`), which must exist
//! 2. `$CCP_CONFIG`, which must exist
//! 3. `<config_dir>/chicago-crimes-pipeline/config.toml`, if present

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::env::{self, apply_env};
use crate::error::ConfigError;
use crate::APP_DIR_NAME;

/// Candidate config file locations.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    pub explicit: Option<PathBuf>,
    pub from_env: Option<PathBuf>,
    pub platform_default: Option<PathBuf>,
}

impl ConfigPaths {
    /// Build the candidate list from an explicit path and an env lookup.
    pub fn discover<F>(explicit: Option<&Path>, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            explicit: explicit.map(Path::to_path_buf),
            from_env: lookup(env::CONFIG_PATH).map(PathBuf::from),
            platform_default: dirs::config_dir()
                .map(|dir| dir.join(APP_DIR_NAME).join("config.toml")),
        }
    }

    /// The file to load, if any. Explicit and env paths must exist.
    pub fn select(&self) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(required) = self.explicit.as_ref().or(self.from_env.as_ref()) {
            if !required.exists() {
                return Err(ConfigError::NotFound(required.clone()));
            }
            return Ok(Some(required.clone()));
        }
        Ok(self.platform_default.clone().filter(|p| p.exists()))
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigOrigin {
    Defaults,
    File(PathBuf),
}

/// A fully resolved configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: PipelineConfig,
    pub origin: ConfigOrigin,
}

/// Resolve against the real process environment.
pub fn resolve_config(explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    resolve_config_with(explicit, env::process_env)
}

/// Resolve with an injected environment lookup.
pub fn resolve_config_with<F>(
    explicit: Option<&Path>,
    lookup: F,
) -> Result<ResolvedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let paths = ConfigPaths::discover(explicit, &lookup);
    let (mut config, origin) = match paths.select()? {
        Some(path) => (load_file(&path)?, ConfigOrigin::File(path)),
        None => (PipelineConfig::default(), ConfigOrigin::Defaults),
    };

    apply_env(&mut config, lookup)?;

    Ok(ResolvedConfig { config, origin })
}

/// Load a TOML config file.
pub fn load_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    PipelineConfig::from_toml_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
