//! Semantic validation of a resolved configuration.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

use crate::config::PipelineConfig;
use crate::error::ConfigError;

/// First year the crimes dataset has data for.
pub const FIRST_DATA_YEAR: i32 = 2001;

/// A single validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating a configuration.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when clean, otherwise every problem as one error.
    pub fn into_result(self) -> Result<(), ConfigError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(self.errors))
        }
    }

    fn push(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(ValidationError::new(field, message));
    }
}

fn bucket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9._-]{1,61}[a-z0-9]$").expect("valid regex"))
}

fn dataset_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]{1,1024}$").expect("valid regex"))
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,1024}$").expect("valid regex"))
}

fn project_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9-]{4,28}[a-z0-9]$").expect("valid regex"))
}

/// Validate `config`, collecting every problem.
///
/// `current_year` bounds the configured start year.
pub fn validate(config: &PipelineConfig, current_year: i32) -> ValidationResult {
    let mut result = ValidationResult::default();

    for (field, url) in [
        ("source.crimes_url", &config.source.crimes_url),
        ("source.schools_url", &config.source.schools_url),
        ("dbt.cloud_url", &config.dbt.cloud_url),
    ] {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            result.push(field, format!("'{url}' is not an http(s) URL"));
        }
    }
    for (field, url) in [
        ("source.crimes_url", &config.source.crimes_url),
        ("source.schools_url", &config.source.schools_url),
    ] {
        if url.contains('?') {
            result.push(field, "must not carry a query string");
        }
    }

    if config.source.row_limit == 0 {
        result.push("source.row_limit", "must be greater than zero");
    }
    if !(FIRST_DATA_YEAR..=current_year).contains(&config.source.start_year) {
        result.push(
            "source.start_year",
            format!(
                "{} outside {FIRST_DATA_YEAR}..={current_year}",
                config.source.start_year
            ),
        );
    }

    for (field, bucket) in [
        ("lake.bucket", &config.lake.bucket),
        ("deploy.bucket", &config.deploy.bucket),
    ] {
        if !bucket_re().is_match(bucket) || bucket.contains("..") {
            result.push(field, format!("'{bucket}' is not a valid bucket name"));
        }
    }

    for (field, prefix) in [
        ("lake.crimes_prefix", &config.lake.crimes_prefix),
        ("lake.schools_prefix", &config.lake.schools_prefix),
    ] {
        if prefix.starts_with('/') {
            result.push(field, "must be relative to the bucket root");
        }
        if prefix.split('/').any(|segment| segment == "..") {
            result.push(field, "must not contain '..'");
        }
        if !prefix.is_empty() && !prefix.ends_with('/') {
            result.push(field, "must end with '/'");
        }
    }

    for (field, name) in [
        ("lake.crimes_file", &config.lake.crimes_file),
        ("lake.schools_file", &config.lake.schools_file),
    ] {
        if name.is_empty() || name.contains(['/', '*', '?']) {
            result.push(field, format!("'{name}' is not a valid file stem"));
        }
    }

    if !config.gcp.project_id.is_empty() && !project_re().is_match(&config.gcp.project_id) {
        result.push(
            "gcp.project_id",
            format!("'{}' is not a valid project id", config.gcp.project_id),
        );
    }

    for (field, dataset) in [
        ("warehouse.dataset", &config.warehouse.dataset),
        ("warehouse.prod_dataset", &config.warehouse.prod_dataset),
    ] {
        if !dataset_re().is_match(dataset) {
            result.push(field, format!("'{dataset}' is not a valid dataset name"));
        }
    }

    for (field, table) in [
        ("warehouse.crimes_table", &config.warehouse.crimes_table),
        ("warehouse.schools_table", &config.warehouse.schools_table),
    ] {
        if !table_re().is_match(table) {
            result.push(field, format!("'{table}' is not a valid table name"));
        }
    }
    if config.warehouse.crimes_table == config.warehouse.schools_table {
        result.push("warehouse.schools_table", "must differ from crimes_table");
    }

    if config.dbt.poll_interval_secs == 0 {
        result.push("dbt.poll_interval_secs", "must be greater than zero");
    }

    result
}
