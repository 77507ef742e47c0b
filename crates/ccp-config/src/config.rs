//! Pipeline configuration types.
//!
//! Every field has a named default so a bare `PipelineConfig::default()` runs
//! against the public Chicago data portal. Files only need to name the fields
//! they change.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::APP_DIR_NAME;

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Where resource handles and deployment manifests are kept.
    pub state_dir: PathBuf,
    pub source: SourceConfig,
    pub lake: LakeConfig,
    pub gcp: GcpConfig,
    pub warehouse: WarehouseConfig,
    pub dbt: DbtConfig,
    pub deploy: DeployConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            source: SourceConfig::default(),
            lake: LakeConfig::default(),
            gcp: GcpConfig::default(),
            warehouse: WarehouseConfig::default(),
            dbt: DbtConfig::default(),
            deploy: DeployConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a TOML document; missing fields keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Public data portal endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub crimes_url: String,
    pub schools_url: String,
    /// Row cap sent with every query (`$limit`).
    pub row_limit: u32,
    /// First year ingested when no explicit years are given.
    pub start_year: i32,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            crimes_url: "https://data.cityofchicago.org/resource/ijzp-q8t2.csv".to_string(),
            schools_url: "https://data.cityofchicago.org/resource/gqgn-ekwj.csv".to_string(),
            row_limit: 100_000,
            start_year: 2001,
            timeout_secs: 300,
        }
    }
}

/// Storage backend for lake files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LakeBackend {
    /// Google Cloud Storage bucket.
    Gcs,
    /// Directory tree on the local filesystem.
    Local,
}

impl FromStr for LakeBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gcs" => Ok(LakeBackend::Gcs),
            "local" => Ok(LakeBackend::Local),
            other => Err(format!("unknown lake backend '{other}' (expected gcs or local)")),
        }
    }
}

impl fmt::Display for LakeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LakeBackend::Gcs => write!(f, "gcs"),
            LakeBackend::Local => write!(f, "local"),
        }
    }
}

/// Parquet compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Snappy,
    Zstd,
    None,
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snappy" => Ok(Compression::Snappy),
            "zstd" => Ok(Compression::Zstd),
            "none" | "uncompressed" => Ok(Compression::None),
            other => Err(format!(
                "unknown compression '{other}' (expected snappy, zstd or none)"
            )),
        }
    }
}

/// Data lake layout and backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LakeConfig {
    pub backend: LakeBackend,
    pub local_root: PathBuf,
    pub compression: Compression,
    pub bucket: String,
    /// Name of the persisted bucket handle.
    pub bucket_block: String,
    pub crimes_prefix: String,
    pub crimes_file: String,
    pub schools_prefix: String,
    pub schools_file: String,
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            backend: LakeBackend::Gcs,
            local_root: PathBuf::from("lake"),
            compression: Compression::Snappy,
            bucket: "chicago-crimes-lake".to_string(),
            bucket_block: "chicago-gcs-bucket".to_string(),
            crimes_prefix: "data/crimes/".to_string(),
            crimes_file: "chicago_crimes".to_string(),
            schools_prefix: "data/".to_string(),
            schools_file: "chicago_schools".to_string(),
        }
    }
}

/// Cloud identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// Empty means "use the project of the credentials".
    pub project_id: String,
    pub service_account_key: PathBuf,
    pub credential_block: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            service_account_key: PathBuf::from("keys/gcp-service-account.json"),
            credential_block: "chicago-gcp-credentials".to_string(),
        }
    }
}

/// Warehouse dataset and table names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub block: String,
    pub dataset: String,
    /// Dataset the transformation toolchain builds into.
    pub prod_dataset: String,
    pub crimes_table: String,
    pub schools_table: String,
    pub location: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            block: "chicago-bq-warehouse".to_string(),
            dataset: "chicago".to_string(),
            prod_dataset: "chicago_prod".to_string(),
            crimes_table: "crimes".to_string(),
            schools_table: "schools".to_string(),
            location: "europe-west6".to_string(),
        }
    }
}

/// Transformation toolchain settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbtConfig {
    pub executable: String,
    pub project_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub cloud_url: String,
    pub account_id: Option<String>,
    pub job_id: Option<String>,
    /// Environment variable holding the hosted-service API key.
    pub api_key_env: String,
    pub credential_block: String,
    pub job_block: String,
    pub max_wait_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for DbtConfig {
    fn default() -> Self {
        Self {
            executable: "dbt".to_string(),
            project_dir: PathBuf::from("dbt"),
            profiles_dir: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".dbt"),
            cloud_url: "https://cloud.getdbt.com".to_string(),
            account_id: None,
            job_id: None,
            api_key_env: "DBT_API_KEY".to_string(),
            credential_block: "chicago-dbt-credentials".to_string(),
            job_block: "chicago-dbt-job".to_string(),
            max_wait_secs: 3600,
            poll_interval_secs: 10,
        }
    }
}

/// Deployment registration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Bucket holding packaged deployment manifests.
    pub bucket: String,
    pub work_queue: String,
    /// Log level injected into every deployment's environment.
    pub log_level: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            bucket: "chicago-crimes-dev".to_string(),
            work_queue: "default".to_string(),
            log_level: "debug".to_string(),
        }
    }
}

/// Default state directory under the platform data dir.
pub fn default_state_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = PipelineConfig::from_toml_str(
            r#"
            [lake]
            bucket = "my-bucket"
            backend = "local"

            [source]
            start_year = 2015
            "#,
        )
        .unwrap();
        assert_eq!(cfg.lake.bucket, "my-bucket");
        assert_eq!(cfg.lake.backend, LakeBackend::Local);
        assert_eq!(cfg.lake.crimes_prefix, "data/crimes/");
        assert_eq!(cfg.source.start_year, 2015);
        assert_eq!(cfg.source.row_limit, 100_000);
        assert_eq!(cfg.warehouse.dataset, "chicago");
    }

    #[test]
    fn toml_roundtrip_preserves_config() {
        let cfg = PipelineConfig::default();
        let text = cfg.to_toml_string().unwrap();
        let back = PipelineConfig::from_toml_str(&text).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn enum_parsing() {
        assert_eq!("GCS".parse::<LakeBackend>().unwrap(), LakeBackend::Gcs);
        assert!("s3".parse::<LakeBackend>().is_err());
        assert_eq!("zstd".parse::<Compression>().unwrap(), Compression::Zstd);
        assert_eq!(
            "uncompressed".parse::<Compression>().unwrap(),
            Compression::None
        );
    }
}
