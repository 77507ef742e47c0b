//! Config resolution against real files.
//!
//! Validates:
//! - A config file overrides built-in defaults
//! - Environment variables override the config file
//! - `CCP_CONFIG` selects the file when no explicit path is given
//! - Malformed files and bad env values surface typed errors

use ccp_config::{
    resolve_config_with, validate, ConfigError, ConfigOrigin, ConfigSnapshot, LakeBackend,
    PipelineConfig,
};
use std::collections::HashMap;
use std::fs;
use tempfile::tempdir;

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

const FILE: &str = r#"
state_dir = "/tmp/ccp-state"

[lake]
backend = "local"
bucket = "file-bucket"
crimes_prefix = "raw/crimes/"

[warehouse]
dataset = "from_file"
"#;

#[test]
fn file_then_env_precedence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ccp.toml");
    fs::write(&path, FILE).unwrap();

    let resolved = resolve_config_with(
        Some(&path),
        env_of(&[("GCS_BUCKET_NAME", "env-bucket"), ("SOURCE_ROW_LIMIT", "500")]),
    )
    .unwrap();

    assert_eq!(resolved.origin, ConfigOrigin::File(path.clone()));
    let cfg = &resolved.config;
    assert_eq!(cfg.lake.bucket, "env-bucket");
    assert_eq!(cfg.lake.backend, LakeBackend::Local);
    assert_eq!(cfg.lake.crimes_prefix, "raw/crimes/");
    assert_eq!(cfg.warehouse.dataset, "from_file");
    assert_eq!(cfg.source.row_limit, 500);
    assert_eq!(cfg.lake.schools_file, "chicago_schools");
    assert!(validate(cfg, 2026).is_ok());
}

#[test]
fn env_var_selects_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("from-env.toml");
    fs::write(&path, FILE).unwrap();
    let path_str = path.to_string_lossy().to_string();

    let resolved = resolve_config_with(None, env_of(&[("CCP_CONFIG", &path_str)])).unwrap();
    assert_eq!(resolved.config.warehouse.dataset, "from_file");
}

#[test]
fn malformed_file_is_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[lake\nbucket = ").unwrap();

    let err = resolve_config_with(Some(&path), |_| None).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));

    let common: ccp_common::Error = err.into();
    assert_eq!(common.code(), 10);
}

#[test]
fn bad_env_value_is_invalid_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ok.toml");
    fs::write(&path, FILE).unwrap();

    let err = resolve_config_with(Some(&path), env_of(&[("LAKE_COMPRESSION", "lz77")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnv { .. }));

    let common: ccp_common::Error = err.into();
    assert_eq!(common.code(), 11);
}

#[test]
fn snapshot_differs_between_file_and_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ccp.toml");
    fs::write(&path, FILE).unwrap();

    let resolved = resolve_config_with(Some(&path), |_| None).unwrap();
    let from_file = ConfigSnapshot::capture(&resolved.config, &resolved.origin).unwrap();
    let defaults =
        ConfigSnapshot::capture(&PipelineConfig::default(), &ConfigOrigin::Defaults).unwrap();

    assert_ne!(from_file.config_hash, defaults.config_hash);
    assert!(from_file.origin.ends_with("ccp.toml"));
}
