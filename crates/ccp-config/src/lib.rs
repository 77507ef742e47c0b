//! Chicago crimes pipeline configuration loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for every tunable of the pipeline, with named defaults
//! - Config resolution (CLI → env → config file → defaults)
//! - Semantic validation reporting every problem at once
//! - Config snapshots for run reports and deployment manifests

pub mod config;
pub mod env;
pub mod error;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use config::{
    Compression, DbtConfig, DeployConfig, GcpConfig, LakeBackend, LakeConfig, PipelineConfig,
    SourceConfig, WarehouseConfig,
};
pub use error::ConfigError;
pub use resolve::{resolve_config, resolve_config_with, ConfigOrigin, ConfigPaths, ResolvedConfig};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Directory name used under the platform config and data directories.
pub const APP_DIR_NAME: &str = "chicago-crimes-pipeline";
