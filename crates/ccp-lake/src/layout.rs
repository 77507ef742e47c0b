//! Deterministic object paths.
//!
//! Crimes: `<prefix><file>_<YYYY>_<MM>.parquet`, one object per month.
//! Schools: `<prefix><file>.parquet`, a single object.

use ccp_common::{Dataset, Partition};
use ccp_config::LakeConfig;
use serde::Serialize;

use crate::error::LakeError;

/// Prefix and file stem of one dataset inside the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetLocation {
    pub prefix: String,
    pub file: String,
}

impl DatasetLocation {
    pub fn new(prefix: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            file: file.into(),
        }
    }
}

/// Where each dataset lives in the lake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LakeLayout {
    pub crimes: DatasetLocation,
    pub schools: DatasetLocation,
}

impl Default for LakeLayout {
    fn default() -> Self {
        Self::from_config(&LakeConfig::default())
    }
}

impl LakeLayout {
    pub fn from_config(config: &LakeConfig) -> Self {
        Self {
            crimes: DatasetLocation::new(&config.crimes_prefix, &config.crimes_file),
            schools: DatasetLocation::new(&config.schools_prefix, &config.schools_file),
        }
    }

    pub fn location(&self, dataset: Dataset) -> &DatasetLocation {
        match dataset {
            Dataset::Crimes => &self.crimes,
            Dataset::Schools => &self.schools,
        }
    }

    /// Object path for one partition of a dataset.
    pub fn object_path(&self, dataset: Dataset, partition: Partition) -> Result<String, LakeError> {
        let loc = self.location(dataset);
        match (dataset, partition) {
            (Dataset::Crimes, Partition::Month { year, month }) => Ok(format!(
                "{}{}_{year}_{month:02}.parquet",
                loc.prefix, loc.file
            )),
            (Dataset::Schools, Partition::Whole) => {
                Ok(format!("{}{}.parquet", loc.prefix, loc.file))
            }
            _ => Err(LakeError::PartitionMismatch {
                dataset: dataset.to_string(),
                partition: partition.label(),
            }),
        }
    }

    /// Wildcard pattern matching every object of a dataset.
    pub fn glob(&self, dataset: Dataset) -> String {
        let loc = self.location(dataset);
        format!("{}{}*.parquet", loc.prefix, loc.file)
    }
}
