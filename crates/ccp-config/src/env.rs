//! Environment variable overrides.
//!
//! Each tunable has exactly one named variable. Lookups go through a caller
//! supplied function so tests never touch the process environment.

use std::path::PathBuf;
use std::str::FromStr;

use crate::config::PipelineConfig;
use crate::error::ConfigError;

pub const CONFIG_PATH: &str = "CCP_CONFIG";
pub const STATE_DIR: &str = "CCP_STATE_DIR";

pub const RAW_DATA_CRIMES_URL: &str = "RAW_DATA_CRIMES_URL";
pub const RAW_DATA_SCHOOLS_URL: &str = "RAW_DATA_SCHOOLS_URL";
pub const SOURCE_ROW_LIMIT: &str = "SOURCE_ROW_LIMIT";
pub const CRIMES_START_YEAR: &str = "CRIMES_START_YEAR";
pub const SOURCE_TIMEOUT_SECS: &str = "SOURCE_TIMEOUT_SECS";

pub const LAKE_BACKEND: &str = "LAKE_BACKEND";
pub const LAKE_LOCAL_ROOT: &str = "LAKE_LOCAL_ROOT";
pub const LAKE_COMPRESSION: &str = "LAKE_COMPRESSION";
pub const GCS_BUCKET_NAME: &str = "GCS_BUCKET_NAME";
pub const GCS_BUCKET_BLOCK_NAME: &str = "GCS_BUCKET_BLOCK_NAME";
pub const GCS_BUCKET_CRIMES_PATH: &str = "GCS_BUCKET_CRIMES_PATH";
pub const GCS_BUCKET_CRIMES_FILE_NAME: &str = "GCS_BUCKET_CRIMES_FILE_NAME";
pub const GCS_BUCKET_SCHOOLS_PATH: &str = "GCS_BUCKET_SCHOOLS_PATH";
pub const GCS_BUCKET_SCHOOLS_FILE_NAME: &str = "GCS_BUCKET_SCHOOLS_FILE_NAME";

pub const GCP_PROJECT_ID: &str = "GCP_PROJECT_ID";
pub const GCP_SERVICE_ACCOUNT_KEY: &str = "GCP_SERVICE_ACCOUNT_KEY";
pub const GCP_CREDENTIAL_BLOCK_NAME: &str = "GCP_CREDENTIAL_BLOCK_NAME";

pub const BQ_BLOCK_NAME: &str = "BQ_BLOCK_NAME";
pub const BQ_DATASET_NAME: &str = "BQ_DATASET_NAME";
pub const BQ_PROD_DATASET_NAME: &str = "BQ_PROD_DATASET_NAME";
pub const BQ_CRIMES_TABLE_NAME: &str = "BQ_CRIMES_TABLE_NAME";
pub const BQ_SCHOOLS_TABLE_NAME: &str = "BQ_SCHOOLS_TABLE_NAME";
pub const BQ_LOCATION: &str = "BQ_LOCATION";

pub const DBT_EXECUTABLE: &str = "DBT_EXECUTABLE";
pub const DBT_PROJECT_DIR: &str = "DBT_PROJECT_DIR";
pub const DBT_PROFILES_DIR: &str = "DBT_PROFILES_DIR";
pub const DBT_CLOUD_URL: &str = "DBT_CLOUD_URL";
pub const DBT_ACCOUNT_ID: &str = "DBT_ACCOUNT_ID";
pub const DBT_JOB_ID: &str = "DBT_JOB_ID";
pub const DBT_API_KEY_ENV: &str = "DBT_API_KEY_ENV";
pub const DBT_CREDENTIAL_BLOCK_NAME: &str = "DBT_CREDENTIAL_BLOCK_NAME";
pub const DBT_JOB_BLOCK_NAME: &str = "DBT_JOB_BLOCK_NAME";
pub const DBT_CLOUD_MAX_WAIT_SECS: &str = "DBT_CLOUD_MAX_WAIT_SECS";

pub const GCS_DEV_BUCKET_NAME: &str = "GCS_DEV_BUCKET_NAME";
pub const DEPLOY_WORK_QUEUE: &str = "DEPLOY_WORK_QUEUE";

/// Read the process environment, treating empty values as unset.
pub fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

struct Overrides<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Overrides<'_, F> {
    fn string(&self, var: &str, target: &mut String) {
        if let Some(value) = (self.lookup)(var) {
            *target = value;
        }
    }

    fn optional(&self, var: &str, target: &mut Option<String>) {
        if let Some(value) = (self.lookup)(var) {
            *target = Some(value);
        }
    }

    fn path(&self, var: &str, target: &mut PathBuf) {
        if let Some(value) = (self.lookup)(var) {
            *target = PathBuf::from(value);
        }
    }

    fn parsed<T>(&self, var: &str, target: &mut T) -> Result<(), ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(value) = (self.lookup)(var) {
            *target = value
                .trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidEnv {
                    var: var.to_string(),
                    value: value.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}

/// Apply environment overrides on top of `config`.
pub fn apply_env<F>(config: &mut PipelineConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = Overrides { lookup: &lookup };

    env.path(STATE_DIR, &mut config.state_dir);

    let source = &mut config.source;
    env.string(RAW_DATA_CRIMES_URL, &mut source.crimes_url);
    env.string(RAW_DATA_SCHOOLS_URL, &mut source.schools_url);
    env.parsed(SOURCE_ROW_LIMIT, &mut source.row_limit)?;
    env.parsed(CRIMES_START_YEAR, &mut source.start_year)?;
    env.parsed(SOURCE_TIMEOUT_SECS, &mut source.timeout_secs)?;

    let lake = &mut config.lake;
    env.parsed(LAKE_BACKEND, &mut lake.backend)?;
    env.path(LAKE_LOCAL_ROOT, &mut lake.local_root);
    env.parsed(LAKE_COMPRESSION, &mut lake.compression)?;
    env.string(GCS_BUCKET_NAME, &mut lake.bucket);
    env.string(GCS_BUCKET_BLOCK_NAME, &mut lake.bucket_block);
    env.string(GCS_BUCKET_CRIMES_PATH, &mut lake.crimes_prefix);
    env.string(GCS_BUCKET_CRIMES_FILE_NAME, &mut lake.crimes_file);
    env.string(GCS_BUCKET_SCHOOLS_PATH, &mut lake.schools_prefix);
    env.string(GCS_BUCKET_SCHOOLS_FILE_NAME, &mut lake.schools_file);

    let gcp = &mut config.gcp;
    env.string(GCP_PROJECT_ID, &mut gcp.project_id);
    env.path(GCP_SERVICE_ACCOUNT_KEY, &mut gcp.service_account_key);
    env.string(GCP_CREDENTIAL_BLOCK_NAME, &mut gcp.credential_block);

    let warehouse = &mut config.warehouse;
    env.string(BQ_BLOCK_NAME, &mut warehouse.block);
    env.string(BQ_DATASET_NAME, &mut warehouse.dataset);
    env.string(BQ_PROD_DATASET_NAME, &mut warehouse.prod_dataset);
    env.string(BQ_CRIMES_TABLE_NAME, &mut warehouse.crimes_table);
    env.string(BQ_SCHOOLS_TABLE_NAME, &mut warehouse.schools_table);
    env.string(BQ_LOCATION, &mut warehouse.location);

    let dbt = &mut config.dbt;
    env.string(DBT_EXECUTABLE, &mut dbt.executable);
    env.path(DBT_PROJECT_DIR, &mut dbt.project_dir);
    env.path(DBT_PROFILES_DIR, &mut dbt.profiles_dir);
    env.string(DBT_CLOUD_URL, &mut dbt.cloud_url);
    env.optional(DBT_ACCOUNT_ID, &mut dbt.account_id);
    env.optional(DBT_JOB_ID, &mut dbt.job_id);
    env.string(DBT_API_KEY_ENV, &mut dbt.api_key_env);
    env.string(DBT_CREDENTIAL_BLOCK_NAME, &mut dbt.credential_block);
    env.string(DBT_JOB_BLOCK_NAME, &mut dbt.job_block);
    env.parsed(DBT_CLOUD_MAX_WAIT_SECS, &mut dbt.max_wait_secs)?;

    let deploy = &mut config.deploy;
    env.string(GCS_DEV_BUCKET_NAME, &mut deploy.bucket);
    env.string(DEPLOY_WORK_QUEUE, &mut deploy.work_queue);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LakeBackend;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn overrides_apply_per_field() {
        let mut cfg = PipelineConfig::default();
        apply_env(
            &mut cfg,
            lookup_from(&[
                (RAW_DATA_CRIMES_URL, "http://localhost/crimes.csv"),
                (SOURCE_ROW_LIMIT, "500"),
                (LAKE_BACKEND, "local"),
                (GCS_BUCKET_NAME, "other-bucket"),
                (DBT_JOB_ID, "42"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.source.crimes_url, "http://localhost/crimes.csv");
        assert_eq!(cfg.source.row_limit, 500);
        assert_eq!(cfg.lake.backend, LakeBackend::Local);
        assert_eq!(cfg.lake.bucket, "other-bucket");
        assert_eq!(cfg.dbt.job_id.as_deref(), Some("42"));
        // untouched fields keep defaults
        assert_eq!(cfg.warehouse.dataset, "chicago");
    }

    #[test]
    fn unparsable_value_names_the_variable() {
        let mut cfg = PipelineConfig::default();
        let err = apply_env(&mut cfg, lookup_from(&[(SOURCE_ROW_LIMIT, "lots")])).unwrap_err();
        match err {
            ConfigError::InvalidEnv { var, value, .. } => {
                assert_eq!(var, SOURCE_ROW_LIMIT);
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
